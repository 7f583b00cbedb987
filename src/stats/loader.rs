//! Reference dataset loading.
//!
//! The classifier, region and fact tables are immutable at runtime and come
//! from externally produced CSV exports (headered, comma-separated). Each
//! load replaces the table contents wholesale.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use sqlx::PgPool;
use tracing::info;

use super::error::Result;

#[derive(Debug, Deserialize)]
struct ClassifierCodeRecord {
    id: i64,
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ClassifierNodeRecord {
    id: i64,
    code: String,
    description: String,
    parent_id: i64,
    active: bool,
}

#[derive(Debug, Deserialize)]
struct RegionRecord {
    #[serde(rename = "id")]
    _id: i64,
    region_code: String,
    region_name: String,
}

#[derive(Debug, Deserialize)]
struct RegionCodifierRecord {
    #[serde(rename = "id")]
    _id: i64,
    region_code: String,
    region_name: String,
    region_id: i64,
}

#[derive(Debug, Deserialize)]
struct FactRecord {
    okpd2_id: i64,
    region_codifier_id: i64,
    contract_count: i64,
    offers_total: i64,
    offers_active: i64,
}

fn read_records<T: serde::de::DeserializeOwned>(reader: impl Read) -> Result<Vec<T>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut records = Vec::new();
    for record in csv_reader.deserialize() {
        records.push(record?);
    }
    Ok(records)
}

pub struct ReferenceLoader {
    pool: PgPool,
}

impl ReferenceLoader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn load_classifier_codes(&self, path: &Path) -> Result<usize> {
        let records: Vec<ClassifierCodeRecord> = read_records(std::fs::File::open(path)?)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("TRUNCATE okpd2 RESTART IDENTITY CASCADE")
            .execute(&mut *tx)
            .await?;
        for record in &records {
            sqlx::query("INSERT INTO okpd2 (id, code, description) VALUES ($1, $2, $3)")
                .bind(record.id)
                .bind(&record.code)
                .bind(&record.description)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("SELECT setval(pg_get_serial_sequence('okpd2', 'id'), (SELECT COALESCE(MAX(id), 1) FROM okpd2))")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(count = records.len(), "Loaded classifier codes");
        Ok(records.len())
    }

    pub async fn load_classifier_nodes(&self, path: &Path) -> Result<usize> {
        let records: Vec<ClassifierNodeRecord> = read_records(std::fs::File::open(path)?)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("TRUNCATE okpd2_codifier")
            .execute(&mut *tx)
            .await?;
        for record in &records {
            sqlx::query(
                r#"
                INSERT INTO okpd2_codifier (id, code, description, parent_id, active)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(record.id)
            .bind(&record.code)
            .bind(&record.description)
            .bind(record.parent_id)
            .bind(record.active)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(count = records.len(), "Loaded classifier nodes");
        Ok(records.len())
    }

    pub async fn load_regions(&self, path: &Path) -> Result<usize> {
        let records: Vec<RegionRecord> = read_records(std::fs::File::open(path)?)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("TRUNCATE region RESTART IDENTITY")
            .execute(&mut *tx)
            .await?;
        for record in &records {
            sqlx::query("INSERT INTO region (region_code, region_name) VALUES ($1, $2)")
                .bind(&record.region_code)
                .bind(&record.region_name)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!(count = records.len(), "Loaded regions");
        Ok(records.len())
    }

    pub async fn load_region_codifiers(&self, path: &Path) -> Result<usize> {
        let records: Vec<RegionCodifierRecord> = read_records(std::fs::File::open(path)?)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("TRUNCATE region_codifier RESTART IDENTITY CASCADE")
            .execute(&mut *tx)
            .await?;
        for record in &records {
            sqlx::query(
                r#"
                INSERT INTO region_codifier (region_code, region_name, region_id)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(&record.region_code)
            .bind(&record.region_name)
            .bind(record.region_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(count = records.len(), "Loaded region codifiers");
        Ok(records.len())
    }

    pub async fn load_facts(&self, path: &Path) -> Result<usize> {
        let records: Vec<FactRecord> = read_records(std::fs::File::open(path)?)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("TRUNCATE procurement_fact RESTART IDENTITY")
            .execute(&mut *tx)
            .await?;
        for record in &records {
            sqlx::query(
                r#"
                INSERT INTO procurement_fact
                    (okpd2_id, region_codifier_id, contract_count, offers_total, offers_active)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(record.okpd2_id)
            .bind(record.region_codifier_id)
            .bind(record.contract_count)
            .bind(record.offers_total)
            .bind(record.offers_active)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(count = records.len(), "Loaded procurement facts");
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_classifier_code_export() {
        let csv = "id,code,description\n1,43.21,Electrical installation works\n2,62.01,Software development\n";
        let records: Vec<ClassifierCodeRecord> = read_records(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].code, "43.21");
        assert_eq!(records[1].id, 2);
    }

    #[test]
    fn parses_classifier_node_export_with_flags() {
        let csv = "id,code,description,parent_id,active\n10,43,Construction,0,true\n11,43.2,Installation,10,false\n";
        let records: Vec<ClassifierNodeRecord> = read_records(csv.as_bytes()).unwrap();
        assert_eq!(records[0].parent_id, 0);
        assert!(records[0].active);
        assert!(!records[1].active);
    }

    #[test]
    fn parses_region_codifier_export() {
        let csv = "id,region_code,region_name,region_id\n1,77,Moscow,77\n";
        let records: Vec<RegionCodifierRecord> = read_records(csv.as_bytes()).unwrap();
        assert_eq!(records[0].region_id, 77);
        assert_eq!(records[0].region_name, "Moscow");
    }

    #[test]
    fn malformed_rows_fail_the_load() {
        let csv = "id,code,description\nnot-a-number,43.21,Broken\n";
        let result: Result<Vec<ClassifierCodeRecord>> = read_records(csv.as_bytes());
        assert!(result.is_err());
    }
}
