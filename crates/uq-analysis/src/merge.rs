use thiserror::Error;
use tracing::{debug, info, warn};
use uq_core::{resolve_time, DataError, DataHandle, DataMapping, DataStore};
use uq_schemas::MergeStep;

use crate::interp::{interp_linear, mean_and_stderr, InterpError};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("merge output {handle} already exists")]
    OutputExists { handle: String },
    #[error("merge output {handle} is also a merge input")]
    OutputCollides { handle: String },
    #[error("template data {handle} lacks merge field {path}: {source}")]
    TemplateField {
        handle: String,
        path: String,
        source: DataError,
    },
    #[error("run {handle} lacks merge field {path}: {source}")]
    RunField {
        handle: String,
        path: String,
        source: DataError,
    },
    #[error("no runs contribute to {path}")]
    NoContributors { path: String },
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Interp(#[from] InterpError),
}

/// Merge the output documents of `handles` into one document derived from
/// `template`, written to `output`.
///
/// Every field named in the plan is rebased onto the template's base grid
/// by linear interpolation, then reduced to its elementwise mean; the
/// standard error lands in a sibling field named `<path>_error`. The
/// output document is written once, after every field merged cleanly.
pub fn merge(
    store: &DataStore,
    handles: &[DataHandle],
    template: &DataHandle,
    output: &DataHandle,
    plan: &[MergeStep],
    skip_empty: bool,
) -> Result<(), MergeError> {
    if handles.iter().any(|h| h == output) || template == output {
        return Err(MergeError::OutputCollides {
            handle: output.to_string(),
        });
    }
    if store.exists(output) {
        return Err(MergeError::OutputExists {
            handle: output.to_string(),
        });
    }

    let mut doc = store.load(template)?;
    let runs: Vec<(DataHandle, DataMapping)> = handles
        .iter()
        .map(|h| store.load(h).map(|d| (h.clone(), d)))
        .collect::<Result<_, _>>()?;
    info!("merging {} runs into {}", runs.len(), output);

    for step in plan {
        for path in &step.paths {
            if path.contains('*') {
                let nt = doc.time_len(path)?;
                for t in 0..nt {
                    merge_field(
                        &mut doc,
                        &runs,
                        template,
                        &resolve_time(path, t),
                        &resolve_time(&step.base_grid, t),
                        skip_empty,
                    )?;
                }
            } else {
                merge_field(&mut doc, &runs, template, path, &step.base_grid, skip_empty)?;
            }
        }
    }

    store.save(output, &doc)?;
    Ok(())
}

/// Merge one fully-resolved field onto one fully-resolved grid.
fn merge_field(
    doc: &mut DataMapping,
    runs: &[(DataHandle, DataMapping)],
    template: &DataHandle,
    path: &str,
    grid_path: &str,
    skip_empty: bool,
) -> Result<(), MergeError> {
    // The template defines the shape of the output; a hole there is
    // always fatal, skip_empty only forgives runs.
    let base_grid = doc.get_array(grid_path).map_err(|source| MergeError::TemplateField {
        handle: template.to_string(),
        path: grid_path.to_string(),
        source,
    })?;
    doc.get_array(path).map_err(|source| MergeError::TemplateField {
        handle: template.to_string(),
        path: path.to_string(),
        source,
    })?;

    let mut rebased = Vec::with_capacity(runs.len());
    for (handle, run_doc) in runs {
        let values = match lookup_pair(run_doc, path, grid_path) {
            Ok((grid, values)) => interp_linear(&grid, &values, &base_grid)?,
            Err(source) if skip_empty && is_hole(&source) => {
                warn!("{}: skipping {} ({})", handle, path, source);
                continue;
            }
            Err(source) => {
                return Err(MergeError::RunField {
                    handle: handle.to_string(),
                    path: path.to_string(),
                    source,
                })
            }
        };
        rebased.push(values);
    }

    if rebased.is_empty() {
        return Err(MergeError::NoContributors {
            path: path.to_string(),
        });
    }

    debug!("{}: {} contributing runs", path, rebased.len());
    let (mean, stderr) = mean_and_stderr(&rebased);
    doc.set_array(path, &mean)?;
    doc.set_array(&format!("{}_error", path), &stderr)?;
    Ok(())
}

fn lookup_pair(
    doc: &DataMapping,
    path: &str,
    grid_path: &str,
) -> Result<(Vec<f64>, Vec<f64>), DataError> {
    let grid = doc.get_array(grid_path)?;
    let values = doc.get_array(path)?;
    Ok((grid, values))
}

fn is_hole(err: &DataError) -> bool {
    matches!(err, DataError::UnknownPath { .. } | DataError::EmptyVar { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn handle(run: u32) -> DataHandle {
        DataHandle {
            user: "uq".to_string(),
            db: "jet".to_string(),
            shot: 94875,
            run,
        }
    }

    fn store(root: &Path) -> DataStore {
        DataStore::new(&root.join("store"))
    }

    fn seed(store: &DataStore, run: u32, yaml: &str) -> DataHandle {
        let h = handle(run);
        store
            .save(&h, &DataMapping::from_yaml(yaml).expect("doc"))
            .expect("seed");
        h
    }

    fn plan(paths: &[&str], grid: &str) -> Vec<MergeStep> {
        vec![MergeStep {
            paths: paths.iter().map(|p| p.to_string()).collect(),
            base_grid: grid.to_string(),
        }]
    }

    const TEMPLATE: &str = "\
profiles_1d:
- grid: { rho: [0.0, 0.5, 1.0] }
  t_i_average: [1.0, 2.0, 3.0]
";

    #[test]
    fn single_run_merge_is_the_identity_with_zero_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        let template = seed(&store, 1, TEMPLATE);
        let run = seed(
            &store,
            8000,
            "\
profiles_1d:
- grid: { rho: [0.0, 0.5, 1.0] }
  t_i_average: [4.0, 5.0, 6.0]
",
        );
        let output = handle(9000);

        merge(
            &store,
            &[run],
            &template,
            &output,
            &plan(
                &["profiles_1d/0/t_i_average"],
                "profiles_1d/0/grid/rho",
            ),
            false,
        )
        .expect("merge");

        let merged = store.load(&output).expect("output");
        assert_eq!(
            merged.get_array("profiles_1d/0/t_i_average").expect("mean"),
            vec![4.0, 5.0, 6.0]
        );
        assert_eq!(
            merged
                .get_array("profiles_1d/0/t_i_average_error")
                .expect("err"),
            vec![0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn two_runs_average_with_closed_form_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        let template = seed(&store, 1, TEMPLATE);
        let a = seed(
            &store,
            8000,
            "\
profiles_1d:
- grid: { rho: [0.0, 0.5, 1.0] }
  t_i_average: [2.0, 2.0, 2.0]
",
        );
        let b = seed(
            &store,
            8001,
            "\
profiles_1d:
- grid: { rho: [0.0, 0.5, 1.0] }
  t_i_average: [4.0, 4.0, 4.0]
",
        );
        let output = handle(9000);

        merge(
            &store,
            &[a, b],
            &template,
            &output,
            &plan(
                &["profiles_1d/0/t_i_average"],
                "profiles_1d/0/grid/rho",
            ),
            false,
        )
        .expect("merge");

        let merged = store.load(&output).expect("output");
        let mean = merged.get_array("profiles_1d/0/t_i_average").expect("mean");
        let err = merged
            .get_array("profiles_1d/0/t_i_average_error")
            .expect("err");
        let expected_err = 2.0 / (2.0 * 2.0_f64.sqrt());
        for j in 0..3 {
            assert!((mean[j] - 3.0).abs() < 1e-12);
            assert!((err[j] - expected_err).abs() < 1e-12);
        }
    }

    #[test]
    fn coarser_runs_are_rebased_onto_the_template_grid() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        let template = seed(&store, 1, TEMPLATE);
        let run = seed(
            &store,
            8000,
            "\
profiles_1d:
- grid: { rho: [0.0, 1.0] }
  t_i_average: [0.0, 10.0]
",
        );
        let output = handle(9000);

        merge(
            &store,
            &[run],
            &template,
            &output,
            &plan(
                &["profiles_1d/0/t_i_average"],
                "profiles_1d/0/grid/rho",
            ),
            false,
        )
        .expect("merge");

        let merged = store.load(&output).expect("output");
        assert_eq!(
            merged.get_array("profiles_1d/0/t_i_average").expect("mean"),
            vec![0.0, 5.0, 10.0]
        );
    }

    #[test]
    fn time_wildcard_merges_every_slice() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        let two_slices = "\
profiles_1d:
- grid: { rho: [0.0, 1.0] }
  t_i_average: [1.0, 1.0]
- grid: { rho: [0.0, 1.0] }
  t_i_average: [2.0, 2.0]
";
        let template = seed(&store, 1, two_slices);
        let run = seed(
            &store,
            8000,
            "\
profiles_1d:
- grid: { rho: [0.0, 1.0] }
  t_i_average: [3.0, 3.0]
- grid: { rho: [0.0, 1.0] }
  t_i_average: [5.0, 5.0]
",
        );
        let output = handle(9000);

        merge(
            &store,
            &[run],
            &template,
            &output,
            &plan(
                &["profiles_1d/*/t_i_average"],
                "profiles_1d/*/grid/rho",
            ),
            false,
        )
        .expect("merge");

        let merged = store.load(&output).expect("output");
        assert_eq!(
            merged.get_array("profiles_1d/0/t_i_average").expect("t0"),
            vec![3.0, 3.0]
        );
        assert_eq!(
            merged.get_array("profiles_1d/1/t_i_average").expect("t1"),
            vec![5.0, 5.0]
        );
        assert!(merged.has_path("profiles_1d/1/t_i_average_error"));
    }

    #[test]
    fn missing_run_field_fails_unless_skip_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        let template = seed(&store, 1, TEMPLATE);
        let good = seed(
            &store,
            8000,
            "\
profiles_1d:
- grid: { rho: [0.0, 0.5, 1.0] }
  t_i_average: [4.0, 4.0, 4.0]
",
        );
        let hollow = seed(
            &store,
            8001,
            "\
profiles_1d:
- grid: { rho: [0.0, 0.5, 1.0] }
",
        );
        let steps = plan(
            &["profiles_1d/0/t_i_average"],
            "profiles_1d/0/grid/rho",
        );

        let err = merge(
            &store,
            &[good.clone(), hollow.clone()],
            &template,
            &handle(9000),
            &steps,
            false,
        )
        .expect_err("err");
        assert!(matches!(err, MergeError::RunField { .. }));
        assert!(!store.exists(&handle(9000)), "nothing written on failure");

        merge(
            &store,
            &[good, hollow],
            &template,
            &handle(9001),
            &steps,
            true,
        )
        .expect("skip_empty merge");
        let merged = store.load(&handle(9001)).expect("output");
        assert_eq!(
            merged.get_array("profiles_1d/0/t_i_average").expect("mean"),
            vec![4.0, 4.0, 4.0]
        );
    }

    #[test]
    fn template_holes_are_fatal_even_with_skip_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        let template = seed(&store, 1, "profiles_1d:\n- grid: { rho: [0.0, 1.0] }\n");
        let run = seed(
            &store,
            8000,
            "\
profiles_1d:
- grid: { rho: [0.0, 1.0] }
  t_i_average: [1.0, 1.0]
",
        );

        let err = merge(
            &store,
            &[run],
            &template,
            &handle(9000),
            &plan(
                &["profiles_1d/0/t_i_average"],
                "profiles_1d/0/grid/rho",
            ),
            true,
        )
        .expect_err("err");
        assert!(matches!(err, MergeError::TemplateField { .. }));
    }

    #[test]
    fn existing_output_is_never_overwritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        let template = seed(&store, 1, TEMPLATE);
        let output = seed(&store, 9000, "already: here");

        let err = merge(&store, &[], &template, &output, &[], false).expect_err("err");
        assert!(matches!(err, MergeError::OutputExists { .. }));
    }

    #[test]
    fn output_handle_may_not_be_an_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        let template = seed(&store, 1, TEMPLATE);
        let run = seed(&store, 8000, TEMPLATE);

        let err = merge(&store, &[run.clone()], &template, &run, &[], false).expect_err("err");
        assert!(matches!(err, MergeError::OutputCollides { .. }));
    }
}
