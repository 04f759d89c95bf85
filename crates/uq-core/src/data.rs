use serde_yaml::{Number, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::fs::atomic_write_bytes;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("unknown path: {path}")]
    UnknownPath { path: String },
    #[error("empty field: {path}")]
    EmptyVar { path: String },
    #[error("field is not numeric: {path}")]
    NotNumeric { path: String },
    #[error("expected an array at: {path}")]
    NotAnArray { path: String },
    #[error("path contains an unresolved wildcard: {path}")]
    Wildcard { path: String },
    #[error("path has no time wildcard: {path}")]
    NoWildcard { path: String },
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Replace every `*` segment in a slash-separated field path with a
/// concrete time index.
pub fn resolve_time(path: &str, t: usize) -> String {
    path.split('/')
        .map(|seg| {
            if seg == "*" {
                t.to_string()
            } else {
                seg.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// One stored simulation-data document: a tree of mappings, sequences and
/// numbers addressed by slash-separated field paths such as
/// `profiles_1d/0/t_i_average`. The time segment is written as `*` and
/// resolved per index before lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct DataMapping {
    root: Value,
}

impl DataMapping {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        Ok(Self::new(serde_yaml::from_str(text)?))
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.root)
    }

    pub fn load(path: &Path) -> Result<Self, DataError> {
        let text = std::fs::read_to_string(path).map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| DataError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), DataError> {
        let text = self.to_yaml().map_err(|source| DataError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        atomic_write_bytes(path, text.as_bytes()).map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn lookup(&self, path: &str) -> Result<&Value, DataError> {
        let mut cur = &self.root;
        for seg in path.split('/') {
            if seg == "*" {
                return Err(DataError::Wildcard {
                    path: path.to_string(),
                });
            }
            cur = step(cur, seg).ok_or_else(|| DataError::UnknownPath {
                path: path.to_string(),
            })?;
        }
        Ok(cur)
    }

    fn lookup_mut(&mut self, path: &str) -> Result<&mut Value, DataError> {
        let mut cur = &mut self.root;
        for seg in path.split('/') {
            if seg == "*" {
                return Err(DataError::Wildcard {
                    path: path.to_string(),
                });
            }
            cur = step_mut(cur, seg).ok_or_else(|| DataError::UnknownPath {
                path: path.to_string(),
            })?;
        }
        Ok(cur)
    }

    pub fn has_path(&self, path: &str) -> bool {
        self.lookup(path).is_ok()
    }

    /// Number of time slices under a wildcard path: the length of the
    /// sequence at the prefix before the first `*`.
    pub fn time_len(&self, path: &str) -> Result<usize, DataError> {
        let prefix: Vec<&str> = path.split('/').take_while(|seg| *seg != "*").collect();
        if prefix.len() == path.split('/').count() {
            return Err(DataError::NoWildcard {
                path: path.to_string(),
            });
        }
        let value = self.lookup(&prefix.join("/"))?;
        value
            .as_sequence()
            .map(|seq| seq.len())
            .ok_or_else(|| DataError::NotAnArray {
                path: path.to_string(),
            })
    }

    pub fn get_number(&self, path: &str) -> Result<f64, DataError> {
        let value = self.lookup(path)?;
        value.as_f64().ok_or_else(|| DataError::NotNumeric {
            path: path.to_string(),
        })
    }

    pub fn get_array(&self, path: &str) -> Result<Vec<f64>, DataError> {
        let value = self.lookup(path)?;
        match value {
            Value::Null => Err(DataError::EmptyVar {
                path: path.to_string(),
            }),
            Value::Sequence(seq) => {
                if seq.is_empty() {
                    return Err(DataError::EmptyVar {
                        path: path.to_string(),
                    });
                }
                seq.iter()
                    .map(|v| {
                        v.as_f64().ok_or_else(|| DataError::NotNumeric {
                            path: path.to_string(),
                        })
                    })
                    .collect()
            }
            _ => Err(DataError::NotAnArray {
                path: path.to_string(),
            }),
        }
    }

    /// Set a value at `path`. The parent must exist; a new key may be
    /// created in a mapping, but sequence elements are replace-only.
    pub fn set(&mut self, path: &str, value: Value) -> Result<(), DataError> {
        let (parent, last) = match path.rsplit_once('/') {
            Some((parent, last)) => (Some(parent), last),
            None => (None, path),
        };
        let target = match parent {
            Some(parent) => self.lookup_mut(parent)?,
            None => &mut self.root,
        };
        match target {
            Value::Mapping(map) => {
                map.insert(Value::String(last.to_string()), value);
                Ok(())
            }
            Value::Sequence(seq) => {
                let idx = last
                    .parse::<usize>()
                    .ok()
                    .filter(|i| *i < seq.len())
                    .ok_or_else(|| DataError::UnknownPath {
                        path: path.to_string(),
                    })?;
                seq[idx] = value;
                Ok(())
            }
            _ => Err(DataError::UnknownPath {
                path: path.to_string(),
            }),
        }
    }

    pub fn set_number(&mut self, path: &str, value: f64) -> Result<(), DataError> {
        self.set(path, Value::Number(Number::from(value)))
    }

    pub fn set_array(&mut self, path: &str, values: &[f64]) -> Result<(), DataError> {
        let seq = values
            .iter()
            .map(|v| Value::Number(Number::from(*v)))
            .collect();
        self.set(path, Value::Sequence(seq))
    }

    /// Apply `f` to the number or to every element of the numeric array
    /// at `path`. The path must already exist.
    pub fn update_numeric<F>(&mut self, path: &str, f: F) -> Result<(), DataError>
    where
        F: Fn(f64) -> f64,
    {
        let value = self.lookup_mut(path)?;
        match value {
            Value::Number(n) => {
                let x = n.as_f64().ok_or_else(|| DataError::NotNumeric {
                    path: path.to_string(),
                })?;
                *value = Value::Number(Number::from(f(x)));
                Ok(())
            }
            Value::Sequence(seq) => {
                if seq.is_empty() {
                    return Err(DataError::EmptyVar {
                        path: path.to_string(),
                    });
                }
                for elem in seq.iter_mut() {
                    let x = elem.as_f64().ok_or_else(|| DataError::NotNumeric {
                        path: path.to_string(),
                    })?;
                    *elem = Value::Number(Number::from(f(x)));
                }
                Ok(())
            }
            Value::Null => Err(DataError::EmptyVar {
                path: path.to_string(),
            }),
            _ => Err(DataError::NotNumeric {
                path: path.to_string(),
            }),
        }
    }
}

fn step<'v>(value: &'v Value, seg: &str) -> Option<&'v Value> {
    match value {
        Value::Mapping(map) => map.get(Value::String(seg.to_string())),
        Value::Sequence(seq) => seg.parse::<usize>().ok().and_then(|i| seq.get(i)),
        _ => None,
    }
}

fn step_mut<'v>(value: &'v mut Value, seg: &str) -> Option<&'v mut Value> {
    match value {
        Value::Mapping(map) => map.get_mut(Value::String(seg.to_string())),
        Value::Sequence(seq) => {
            let idx = seg.parse::<usize>().ok()?;
            seq.get_mut(idx)
        }
        _ => None,
    }
}
