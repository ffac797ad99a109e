//! JSON-lines export of a run for replay and debugging
//!
//! The first line is a header carrying identity, state and agent
//! definitions; every following line is one [`RunRecord`] in execution order.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde_json::Value;

use super::{FlockContext, RunRecord};
use crate::error::{FlockError, Result};

/// Schema version written into the export header
pub const HISTORY_SCHEMA_VERSION: u32 = 1;

impl FlockContext {
    /// Save the context as a JSON-lines file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);

        let header = serde_json::json!({
            "type": "header",
            "schema_version": HISTORY_SCHEMA_VERSION,
            "run_id": self.run_id,
            "workflow_id": self.workflow_id,
            "workflow_timestamp": self.workflow_timestamp,
            "version": self.version,
            "state": self.state,
            "agent_definitions": self.agent_definitions,
        });
        writeln!(writer, "{}", serde_json::to_string(&header)?)?;

        for record in &self.history {
            writeln!(writer, "{}", serde_json::to_string(record)?)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Load a context previously written by [`save`](Self::save)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| FlockError::Serialization("empty history file".to_string()))??;
        let mut header: Value = serde_json::from_str(&header_line)?;

        let schema_version = header["schema_version"].as_u64().unwrap_or(0);
        if schema_version != u64::from(HISTORY_SCHEMA_VERSION) {
            return Err(FlockError::Serialization(format!(
                "unsupported history schema version {}",
                schema_version
            )));
        }

        let mut history = Vec::new();
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: RunRecord = serde_json::from_str(&line)?;
            history.push(record);
        }

        if let Some(object) = header.as_object_mut() {
            object.remove("type");
            object.remove("schema_version");
            object.insert("history".to_string(), serde_json::to_value(history)?);
        }

        FlockContext::from_dict(header)
    }
}
