use crate::symbol::pair::{AbstractOrderedPair, ConcreteOrderedPair};
use anyhow::{Context, Result};
use log;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Receives one record per processed query. There is no read path.
pub trait OracleSink {
    fn add(&mut self, abstract_pair: &AbstractOrderedPair, concrete_pair: &ConcreteOrderedPair) -> Result<()>;
}

impl<O: OracleSink + ?Sized> OracleSink for Box<O> {
    fn add(&mut self, abstract_pair: &AbstractOrderedPair, concrete_pair: &ConcreteOrderedPair) -> Result<()> {
        (**self).add(abstract_pair, concrete_pair)
    }
}

#[derive(Debug, Serialize)]
pub struct OracleRecord<'a> {
    pub id: Uuid,
    #[serde(rename = "abstract")]
    pub abstract_pair: &'a AbstractOrderedPair,
    #[serde(rename = "concrete")]
    pub concrete_pair: &'a ConcreteOrderedPair,
}

impl<'a> OracleRecord<'a> {
    pub fn new(abstract_pair: &'a AbstractOrderedPair, concrete_pair: &'a ConcreteOrderedPair) -> Self {
        Self {
            id: Uuid::new_v4(),
            abstract_pair,
            concrete_pair,
        }
    }
}

/// Appends records as json lines.
pub struct JsonLinesOracle {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonLinesOracle {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context(format!("Failed to open oracle table {:?}.", path))?;
        log::info!("Oracle records go to {:?}.", path);

        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }
}

impl OracleSink for JsonLinesOracle {
    fn add(&mut self, abstract_pair: &AbstractOrderedPair, concrete_pair: &ConcreteOrderedPair) -> Result<()> {
        let record = OracleRecord::new(abstract_pair, concrete_pair);
        let line = serde_json::to_string(&record)?;
        writeln!(self.writer, "{}", line)
            .and_then(|_| self.writer.flush())
            .context(format!("Failed to append to oracle table {:?}.", self.path))?;
        log::debug!("Oracle record {} stored.", record.id);

        Ok(())
    }
}

/// Keeps records in memory. Used when no oracle table is configured.
#[derive(Debug, Default)]
pub struct MemoryOracle {
    pub records: Vec<(AbstractOrderedPair, ConcreteOrderedPair)>,
}

impl OracleSink for MemoryOracle {
    fn add(&mut self, abstract_pair: &AbstractOrderedPair, concrete_pair: &ConcreteOrderedPair) -> Result<()> {
        self.records.push((abstract_pair.clone(), concrete_pair.clone()));
        Ok(())
    }
}
