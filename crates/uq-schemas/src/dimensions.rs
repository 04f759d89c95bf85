use serde::{Deserialize, Serialize};
use thiserror::Error;
use uq_core::{DataError, DataMapping};

#[derive(Debug, Error)]
pub enum DimensionError {
    #[error("dimension for {path} expands to no assignments")]
    Empty { path: String },
    #[error("coupled dimension value lists have mismatched lengths: {paths:?} -> {lengths:?}")]
    CoupledLengthMismatch {
        paths: Vec<String>,
        lengths: Vec<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    #[default]
    Copyto,
    Add,
    Multiply,
}

/// One concrete perturbation applied to a single run's input data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Operation {
    pub path: String,
    #[serde(default)]
    pub operator: Operator,
    pub value: f64,
}

impl Operation {
    /// Apply this perturbation to a data document. The target path must
    /// exist; unknown paths are surfaced, never ignored.
    pub fn apply(&self, data: &mut DataMapping) -> Result<(), DataError> {
        let value = self.value;
        match self.operator {
            Operator::Copyto => data.update_numeric(&self.path, |_| value),
            Operator::Add => data.update_numeric(&self.path, |x| x + value),
            Operator::Multiply => data.update_numeric(&self.path, |x| x * value),
        }
    }
}

/// One perturbation axis: a field path plus the list of values it takes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationDim {
    pub path: String,
    #[serde(default)]
    pub operator: Operator,
    pub values: Vec<f64>,
}

/// A declarative perturbation dimension: either a single operation axis,
/// or a coupled group whose members vary together (zipped by value index).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dimension {
    Coupled { coupled: Vec<OperationDim> },
    Operation(OperationDim),
}

/// The fully-specified perturbation for one run: one operation per
/// member of the dimension.
pub type Assignment = Vec<Operation>;

impl Dimension {
    pub fn expand(&self) -> Result<Vec<Assignment>, DimensionError> {
        match self {
            Dimension::Operation(dim) => {
                if dim.values.is_empty() {
                    return Err(DimensionError::Empty {
                        path: dim.path.clone(),
                    });
                }
                Ok(dim
                    .values
                    .iter()
                    .map(|v| {
                        vec![Operation {
                            path: dim.path.clone(),
                            operator: dim.operator,
                            value: *v,
                        }]
                    })
                    .collect())
            }
            Dimension::Coupled { coupled } => {
                let paths: Vec<String> = coupled.iter().map(|d| d.path.clone()).collect();
                let lengths: Vec<usize> = coupled.iter().map(|d| d.values.len()).collect();
                let n = *lengths.first().unwrap_or(&0);
                if n == 0 {
                    return Err(DimensionError::Empty {
                        path: paths.first().cloned().unwrap_or_default(),
                    });
                }
                if lengths.iter().any(|l| *l != n) {
                    return Err(DimensionError::CoupledLengthMismatch { paths, lengths });
                }
                Ok((0..n)
                    .map(|i| {
                        coupled
                            .iter()
                            .map(|d| Operation {
                                path: d.path.clone(),
                                operator: d.operator,
                                value: d.values[i],
                            })
                            .collect()
                    })
                    .collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_dim_expands_one_assignment_per_value() {
        let dim = Dimension::Operation(OperationDim {
            path: "profiles_1d/0/t_i_average".to_string(),
            operator: Operator::Multiply,
            values: vec![0.9, 1.0, 1.1],
        });
        let assignments = dim.expand().expect("expand");
        assert_eq!(assignments.len(), 3);
        assert_eq!(assignments[2][0].value, 1.1);
        assert_eq!(assignments[2][0].operator, Operator::Multiply);
    }

    #[test]
    fn coupled_dims_vary_together() {
        let dim = Dimension::Coupled {
            coupled: vec![
                OperationDim {
                    path: "a".to_string(),
                    operator: Operator::Copyto,
                    values: vec![1.0, 2.0],
                },
                OperationDim {
                    path: "b".to_string(),
                    operator: Operator::Copyto,
                    values: vec![10.0, 20.0],
                },
            ],
        };
        let assignments = dim.expand().expect("expand");
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[1].len(), 2);
        assert_eq!(assignments[1][0].value, 2.0);
        assert_eq!(assignments[1][1].value, 20.0);
    }

    #[test]
    fn coupled_length_mismatch_is_rejected() {
        let dim = Dimension::Coupled {
            coupled: vec![
                OperationDim {
                    path: "a".to_string(),
                    operator: Operator::Copyto,
                    values: vec![1.0, 2.0],
                },
                OperationDim {
                    path: "b".to_string(),
                    operator: Operator::Copyto,
                    values: vec![10.0],
                },
            ],
        };
        assert!(matches!(
            dim.expand(),
            Err(DimensionError::CoupledLengthMismatch { .. })
        ));
    }

    #[test]
    fn empty_values_are_rejected() {
        let dim = Dimension::Operation(OperationDim {
            path: "a".to_string(),
            operator: Operator::Copyto,
            values: vec![],
        });
        assert!(matches!(dim.expand(), Err(DimensionError::Empty { .. })));
    }

    #[test]
    fn dimension_yaml_forms_parse() {
        let single: Dimension = serde_yaml::from_str(
            "path: profiles_1d/0/zeff\noperator: add\nvalues: [0.1, 0.2]\n",
        )
        .expect("single");
        assert!(matches!(single, Dimension::Operation(_)));

        let coupled: Dimension = serde_yaml::from_str(
            "coupled:\n- path: a\n  values: [1.0]\n- path: b\n  values: [2.0]\n",
        )
        .expect("coupled");
        assert!(matches!(coupled, Dimension::Coupled { .. }));
    }

    #[test]
    fn operators_apply_to_scalars_and_arrays() {
        let mut data =
            DataMapping::from_yaml("field: [1.0, 2.0]\nscalar: 4.0").expect("doc");
        Operation {
            path: "field".to_string(),
            operator: Operator::Add,
            value: 1.0,
        }
        .apply(&mut data)
        .expect("add");
        assert_eq!(data.get_array("field").expect("get"), vec![2.0, 3.0]);

        Operation {
            path: "scalar".to_string(),
            operator: Operator::Copyto,
            value: 7.5,
        }
        .apply(&mut data)
        .expect("copyto");
        assert_eq!(data.get_number("scalar").expect("get"), 7.5);

        let err = Operation {
            path: "nope".to_string(),
            operator: Operator::Add,
            value: 1.0,
        }
        .apply(&mut data)
        .expect_err("unknown path");
        assert!(matches!(err, DataError::UnknownPath { .. }));
    }
}
