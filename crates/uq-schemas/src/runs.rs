use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uq_core::fs::atomic_write_bytes;
use uq_core::DataHandle;

use crate::dimensions::Operation;

#[derive(Debug, Error)]
pub enum HandleFileError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("missing column in {path}: {column}")]
    MissingColumn { path: PathBuf, column: String },
    #[error("bad value for {column} in {path}: {value}")]
    BadField {
        path: PathBuf,
        column: String,
        value: String,
    },
    #[error("cannot open run collection file: {path}")]
    UnsupportedFormat { path: PathBuf },
}

/// One generated run as recorded in the run collection file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunRecord {
    pub dirname: String,
    pub data_in: DataHandle,
    pub data_out: DataHandle,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Runs(pub Vec<RunRecord>);

impl Runs {
    pub fn load(path: &Path) -> Result<Self, HandleFileError> {
        let text = std::fs::read_to_string(path).map_err(|source| HandleFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| HandleFileError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), HandleFileError> {
        let text = serde_yaml::to_string(self).map_err(|source| HandleFileError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        atomic_write_bytes(path, text.as_bytes()).map_err(|source| HandleFileError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &RunRecord> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Read a collection of data handles, keyed by run identifier.
///
/// Accepts the YAML run collection written by `create` (identifier =
/// dirname, handle = output data) or a CSV with an index column followed
/// by `user`, `db`, `shot` and `run` columns.
pub fn read_handles_from_file(
    path: &Path,
) -> Result<BTreeMap<String, DataHandle>, HandleFileError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "csv" => read_handles_from_csv(path),
        "yaml" | "yml" => {
            let runs = Runs::load(path)?;
            Ok(runs
                .iter()
                .map(|r| (r.dirname.clone(), r.data_out.clone()))
                .collect())
        }
        _ => Err(HandleFileError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

fn read_handles_from_csv(path: &Path) -> Result<BTreeMap<String, DataHandle>, HandleFileError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let col = |name: &str| -> Result<usize, HandleFileError> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| HandleFileError::MissingColumn {
                path: path.to_path_buf(),
                column: name.to_string(),
            })
    };
    let user_col = col("user")?;
    let db_col = col("db")?;
    let shot_col = col("shot")?;
    let run_col = col("run")?;

    let parse_u32 = |column: &str, value: &str| -> Result<u32, HandleFileError> {
        value
            .trim()
            .parse::<u32>()
            .map_err(|_| HandleFileError::BadField {
                path: path.to_path_buf(),
                column: column.to_string(),
                value: value.to_string(),
            })
    };

    let mut handles = BTreeMap::new();
    for record in reader.records() {
        let record = record?;
        let index = record.get(0).unwrap_or_default().to_string();
        let handle = DataHandle {
            user: record.get(user_col).unwrap_or_default().to_string(),
            db: record.get(db_col).unwrap_or_default().to_string(),
            shot: parse_u32("shot", record.get(shot_col).unwrap_or_default())?,
            run: parse_u32("run", record.get(run_col).unwrap_or_default())?,
        };
        handles.insert(index, handle);
    }
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(i: u32) -> RunRecord {
        RunRecord {
            dirname: format!("run_{:04}", i),
            data_in: DataHandle {
                user: "uq".to_string(),
                db: "jet".to_string(),
                shot: 94875,
                run: 7000 + i,
            },
            data_out: DataHandle {
                user: "uq".to_string(),
                db: "jet".to_string(),
                shot: 94875,
                run: 8000 + i,
            },
            operations: vec![],
        }
    }

    #[test]
    fn runs_yaml_round_trips_and_maps_to_output_handles() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("runs.yaml");
        let runs = Runs(vec![record(0), record(1)]);
        runs.save(&path).expect("save");

        let loaded = Runs::load(&path).expect("load");
        assert_eq!(loaded, runs);

        let handles = read_handles_from_file(&path).expect("handles");
        assert_eq!(handles.len(), 2);
        assert_eq!(handles["run_0001"].run, 8001);
    }

    #[test]
    fn csv_collection_uses_first_column_as_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.csv");
        std::fs::write(
            &path,
            "id,user,db,shot,run\nbase,g2fred,jet,94875,250\nvariant,g2fred,jet,94875,251\n",
        )
        .expect("write");

        let handles = read_handles_from_file(&path).expect("handles");
        assert_eq!(handles.len(), 2);
        assert_eq!(handles["base"].run, 250);
        assert_eq!(handles["variant"].user, "g2fred");
    }

    #[test]
    fn csv_missing_column_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "id,user,db,shot\nbase,g2fred,jet,94875\n").expect("write");
        let err = read_handles_from_file(&path).expect_err("err");
        assert!(matches!(err, HandleFileError::MissingColumn { .. }));
        assert!(err.to_string().contains("run"));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = read_handles_from_file(Path::new("runs.toml")).expect_err("err");
        assert!(matches!(err, HandleFileError::UnsupportedFormat { .. }));
    }
}
