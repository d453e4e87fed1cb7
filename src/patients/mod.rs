// Patient record store
// JSON-backed discharge records looked up by name for prompt personalization


use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// A discharged patient's summary
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PatientRecord {
    #[serde(alias = "name")]
    pub patient_name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub primary_diagnosis: Option<String>,
    #[serde(default)]
    pub discharge_date: Option<NaiveDate>,
    #[serde(default)]
    pub medications: Vec<String>,
    #[serde(default)]
    pub recent_symptoms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl PatientRecord {
    #[inline]
    pub fn new(patient_name: impl Into<String>) -> Self {
        Self {
            patient_name: patient_name.into(),
            ..Self::default()
        }
    }
}

impl fmt::Display for PatientRecord {
    /// Bullet list injected into prompts; unknown fields print as "Unknown"
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn or_unknown<T: ToString>(value: Option<&T>) -> String {
            value.map_or_else(|| "Unknown".to_string(), ToString::to_string)
        }

        fn list_or_none(items: &[String]) -> String {
            if items.is_empty() {
                "None".to_string()
            } else {
                items.iter().join(", ")
            }
        }

        writeln!(f, "Patient Information:")?;
        writeln!(f, "- Name: {}", self.patient_name)?;
        writeln!(f, "- Age: {}", or_unknown(self.age.as_ref()))?;
        writeln!(f, "- Gender: {}", or_unknown(self.gender.as_ref()))?;
        writeln!(
            f,
            "- Primary Diagnosis: {}",
            or_unknown(self.primary_diagnosis.as_ref())
        )?;
        writeln!(
            f,
            "- Discharge Date: {}",
            or_unknown(self.discharge_date.as_ref())
        )?;
        writeln!(f, "- Current Medications: {}", list_or_none(&self.medications))?;
        write!(f, "- Recent Symptoms: {}", list_or_none(&self.recent_symptoms))
    }
}

/// Name-based patient lookup used by the answering and agent layers
pub trait PatientLookup: Send + Sync {
    /// Case-insensitive exact match on the patient's name
    fn lookup(&self, name: &str) -> Result<Option<PatientRecord>>;
}

/// Patient records kept as a JSON array in a single file.
///
/// There is no locking; concurrent writers are last-write-wins.
#[derive(Debug, Clone)]
pub struct PatientStore {
    path: PathBuf,
}

impl PatientStore {
    #[inline]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record. A missing file is created empty; an unparseable
    /// file is logged and treated as empty.
    #[inline]
    pub fn load_all(&self) -> Result<Vec<PatientRecord>> {
        if !self.path.exists() {
            warn!(
                source = "PatientDB",
                "No patient database at {}, creating an empty one",
                self.path.display()
            );
            self.save_all(&[])?;
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read patient database: {}", self.path.display()))?;

        match serde_json::from_str(&content) {
            Ok(records) => Ok(records),
            Err(e) => {
                error!(
                    source = "PatientDB",
                    "Corrupted patient database {}: {}",
                    self.path.display(),
                    e
                );
                Ok(Vec::new())
            }
        }
    }

    /// Append a record, stamping its creation time
    #[inline]
    pub fn add(&self, mut record: PatientRecord) -> Result<PatientRecord> {
        if record.patient_name.trim().is_empty() {
            anyhow::bail!("Patient name cannot be empty");
        }

        let mut records = self.load_all()?;
        record.created_at = Some(Utc::now());
        records.push(record.clone());
        self.save_all(&records)?;

        info!(source = "PatientDB", "Added record for {}", record.patient_name);
        Ok(record)
    }

    fn save_all(&self, records: &[PatientRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create patient directory: {}", parent.display())
            })?;
        }

        let content =
            serde_json::to_string_pretty(records).context("Failed to serialize patient records")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write patient database: {}", self.path.display()))?;
        Ok(())
    }
}

impl PatientLookup for PatientStore {
    #[inline]
    fn lookup(&self, name: &str) -> Result<Option<PatientRecord>> {
        let wanted = name.trim().to_lowercase();
        let matches: Vec<PatientRecord> = self
            .load_all()?
            .into_iter()
            .filter(|record| record.patient_name.trim().to_lowercase() == wanted)
            .collect();

        if matches.len() > 1 {
            warn!(
                source = "PatientDB",
                "Multiple records found for {}, returning the latest", name
            );
        }

        // Later discharges win; among equal dates the most recently added record wins
        let latest = matches
            .into_iter()
            .max_by_key(|record| record.discharge_date);

        match &latest {
            Some(_) => info!(source = "PatientDB", "Retrieved record for {}", name),
            None => info!(source = "PatientDB", "No record found for {}", name),
        }

        Ok(latest)
    }
}
