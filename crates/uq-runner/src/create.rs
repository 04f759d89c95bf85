use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use tracing::{debug, info};
use uq_core::{DataHandle, DataStore};
use uq_schemas::{Assignment, Config, CreateConfig, RunRecord, Runs};

use crate::jobs::Job;
use crate::op_queue::OpQueue;
use crate::samplers::sample;
use crate::system::System;

/// Plan a full sweep: expand the dimension matrix, sample it, and queue
/// one batch of filesystem operations per generated run. Nothing is
/// touched until the queue is applied; validation happens up front so a
/// dry run reports the same failures a real run would.
pub fn create_runs<'a>(
    cfg: &'a Config,
    system: &'a dyn System,
    queue: &mut OpQueue<'a>,
    force: bool,
) -> Result<Runs> {
    let create = cfg
        .create
        .as_ref()
        .ok_or_else(|| anyhow!("config has no create section"))?;

    if !create.template.is_dir() {
        bail!("template directory not found: {}", create.template.display());
    }
    let store = DataStore::new(&cfg.workspace.store_root);
    if !store.exists(&create.template_data) {
        bail!(
            "template data {} not found under {}",
            create.template_data,
            cfg.workspace.store_root.display()
        );
    }

    let template_doc = store
        .load(&create.template_data)
        .with_context(|| format!("cannot load template data {}", create.template_data))?;

    let mut dims: Vec<Vec<Assignment>> = Vec::with_capacity(create.dimensions.len());
    for dim in &create.dimensions {
        let assignments = dim.expand()?;
        for assignment in &assignments {
            for op in assignment {
                if !template_doc.has_path(&op.path) {
                    bail!(
                        "dimension path {} not present in template data {}",
                        op.path,
                        create.template_data
                    );
                }
            }
        }
        dims.push(assignments);
    }

    if !force {
        if cfg.workspace.runs_file.exists() {
            bail!(
                "{} exists, sweep already created (use force to overwrite)",
                cfg.workspace.runs_file.display()
            );
        }
        if runs_dir_is_occupied(cfg)? {
            bail!(
                "{} is not empty (use force to overwrite)",
                cfg.workspace.runs_dir.display()
            );
        }
    }

    let points = sample(&dims, &create.sampler)?;
    info!("creating {} runs", points.len());

    let mut records = Vec::with_capacity(points.len());
    for (i, point) in points.iter().enumerate() {
        let operations: Vec<_> = point.iter().flat_map(|a| a.iter().cloned()).collect();
        let record = RunRecord {
            dirname: format!("run_{:04}", i),
            data_in: variant_handle(create, create.data.run_in_start_at + i as u32),
            data_out: variant_handle(create, create.data.run_out_start_at + i as u32),
            operations,
        };
        debug!(
            "{}: {} -> {}",
            record.dirname, record.data_in, record.data_out
        );
        queue_run(cfg, create, system, queue, &store, &record);
        records.push(record);
    }

    let runs = Runs(records);
    let runs_for_save = runs.clone();
    let runs_file = cfg.workspace.runs_file.clone();
    queue.push(
        format!("write run collection {}", runs_file.display()),
        move || {
            runs_for_save
                .save(&runs_file)
                .map_err(anyhow::Error::from)
        },
    );
    Ok(runs)
}

fn runs_dir_is_occupied(cfg: &Config) -> Result<bool> {
    if !cfg.workspace.runs_dir.is_dir() {
        return Ok(false);
    }
    let mut entries = fs::read_dir(&cfg.workspace.runs_dir)
        .with_context(|| format!("cannot read {}", cfg.workspace.runs_dir.display()))?;
    Ok(entries.next().is_some())
}

fn variant_handle(create: &CreateConfig, run: u32) -> DataHandle {
    DataHandle {
        user: create
            .data
            .user
            .clone()
            .unwrap_or_else(|| create.template_data.user.clone()),
        db: create
            .data
            .db
            .clone()
            .unwrap_or_else(|| create.template_data.db.clone()),
        shot: create.template_data.shot,
        run,
    }
}

fn queue_run<'a>(
    cfg: &'a Config,
    create: &'a CreateConfig,
    system: &'a dyn System,
    queue: &mut OpQueue<'a>,
    store: &DataStore,
    record: &RunRecord,
) {
    let run_dir = cfg.workspace.runs_dir.join(&record.dirname);
    let job = Job::new(&run_dir, &cfg.submit, &cfg.status);

    {
        let run_dir = run_dir.clone();
        queue.push(
            format!("copy template to {}", run_dir.display()),
            move || {
                system
                    .copy_from_template(&create.template, &run_dir)
                    .map_err(anyhow::Error::from)
            },
        );
    }
    {
        let store = store.clone();
        let data_in = record.data_in.clone();
        queue.push(
            format!("copy input data {} -> {}", create.template_data, data_in),
            move || {
                store
                    .copy(&create.template_data, &data_in)
                    .map_err(anyhow::Error::from)
            },
        );
    }
    {
        let store = store.clone();
        let data_in = record.data_in.clone();
        let operations = record.operations.clone();
        let description = operations
            .iter()
            .map(|op| format!("{:?} {} {}", op.operator, op.path, op.value))
            .collect::<Vec<_>>()
            .join(", ");
        queue.push(format!("apply to {}: {}", data_in, description), move || {
            let mut doc = store.load(&data_in)?;
            for op in &operations {
                op.apply(&mut doc)?;
            }
            store.save(&data_in, &doc).map_err(anyhow::Error::from)
        });
    }
    {
        let run_dir = run_dir.clone();
        let data_in = record.data_in.clone();
        let data_out = record.data_out.clone();
        queue.push(
            format!("record data locations in {}", run_dir.display()),
            move || {
                system
                    .update_data_locations(&run_dir, &data_in, &data_out)
                    .map_err(anyhow::Error::from)
            },
        );
    }
    queue.push(
        format!("write batch script {}", job.submit_script.display()),
        move || system.write_batchfile(&job).map_err(anyhow::Error::from),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::DummySystem;
    use std::path::Path;
    use uq_core::fs::ensure_dir;
    use uq_core::DataMapping;
    use uq_schemas::{DataLocation, Dimension, OperationDim, Operator, Sampler};

    const TEMPLATE_DOC: &str = "\
profiles_1d:
- t_i_average: [1000.0, 900.0]
  electrons:
    temperature: [2000.0, 1800.0]
";

    fn setup(root: &Path) -> Config {
        let template = root.join("template");
        ensure_dir(&template).expect("template dir");
        fs::write(template.join("driver.sh"), "#!/bin/sh\n").expect("driver");

        let template_data = DataHandle {
            user: "uq".to_string(),
            db: "jet".to_string(),
            shot: 94875,
            run: 1,
        };
        let store = DataStore::new(&root.join("store"));
        store
            .save(
                &template_data,
                &DataMapping::from_yaml(TEMPLATE_DOC).expect("doc"),
            )
            .expect("seed store");

        Config {
            create: Some(CreateConfig {
                dimensions: vec![
                    Dimension::Operation(OperationDim {
                        path: "profiles_1d/0/t_i_average".to_string(),
                        operator: Operator::Multiply,
                        values: vec![0.9, 1.1],
                    }),
                    Dimension::Operation(OperationDim {
                        path: "profiles_1d/0/electrons/temperature".to_string(),
                        operator: Operator::Multiply,
                        values: vec![0.8, 1.2],
                    }),
                ],
                sampler: Sampler::CartesianProduct,
                template,
                template_data,
                data: DataLocation::default(),
            }),
            workspace: uq_schemas::WorkspaceConfig {
                runs_dir: root.join("runs"),
                store_root: root.join("store"),
                runs_file: root.join("runs.yaml"),
            },
            ..Config::default()
        }
    }

    #[test]
    fn cartesian_sweep_creates_every_combination() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = setup(dir.path());
        let system = DummySystem;
        let mut queue = OpQueue::new(false);

        let runs = create_runs(&cfg, &system, &mut queue, false).expect("plan");
        assert_eq!(runs.len(), 4);
        queue.apply_all().expect("apply");

        assert!(cfg.workspace.runs_file.is_file());
        let loaded = Runs::load(&cfg.workspace.runs_file).expect("runs.yaml");
        assert_eq!(loaded, runs);

        let store = DataStore::new(&cfg.workspace.store_root);
        let record = &loaded.0[0];
        assert_eq!(record.dirname, "run_0000");
        assert_eq!(record.data_in.run, 7000);
        assert_eq!(record.data_out.run, 8000);

        // First point multiplies both fields by their smallest factors.
        let doc = store.load(&record.data_in).expect("doc");
        let ti = doc.get_array("profiles_1d/0/t_i_average").expect("ti");
        assert!((ti[0] - 900.0).abs() < 1e-9);
        let te = doc
            .get_array("profiles_1d/0/electrons/temperature")
            .expect("te");
        assert!((te[0] - 1600.0).abs() < 1e-9);

        let run_dir = cfg.workspace.runs_dir.join("run_0000");
        assert!(run_dir.join("driver.sh").is_file());
        assert!(run_dir.join("submit.sh").is_file());
        assert!(run_dir.join("data_locations.yaml").is_file());
    }

    #[test]
    fn dry_run_plans_without_touching_anything() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = setup(dir.path());
        let system = DummySystem;
        let mut queue = OpQueue::new(true);

        let runs = create_runs(&cfg, &system, &mut queue, false).expect("plan");
        assert_eq!(runs.len(), 4);
        assert!(!queue.is_empty());
        queue.apply_all().expect("apply");

        assert!(!cfg.workspace.runs_file.exists());
        assert!(!cfg.workspace.runs_dir.exists());
    }

    #[test]
    fn existing_sweep_requires_force() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = setup(dir.path());
        fs::write(&cfg.workspace.runs_file, "[]\n").expect("existing");

        let system = DummySystem;
        let mut queue = OpQueue::new(false);
        let err = create_runs(&cfg, &system, &mut queue, false).expect_err("err");
        assert!(err.to_string().contains("force"));

        let mut queue = OpQueue::new(false);
        create_runs(&cfg, &system, &mut queue, true).expect("forced");
    }

    #[test]
    fn unknown_dimension_path_fails_before_queueing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = setup(dir.path());
        if let Some(create) = cfg.create.as_mut() {
            create.dimensions.push(Dimension::Operation(OperationDim {
                path: "profiles_1d/0/no_such_field".to_string(),
                operator: Operator::Add,
                values: vec![1.0],
            }));
        }

        let system = DummySystem;
        let mut queue = OpQueue::new(false);
        let err = create_runs(&cfg, &system, &mut queue, false).expect_err("err");
        assert!(err.to_string().contains("no_such_field"));
        assert!(queue.is_empty());
    }

    #[test]
    fn data_location_overrides_user_and_db() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = setup(dir.path());
        if let Some(create) = cfg.create.as_mut() {
            create.data.user = Some("sweepuser".to_string());
            create.data.db = Some("aug".to_string());
        }

        let system = DummySystem;
        let mut queue = OpQueue::new(true);
        let runs = create_runs(&cfg, &system, &mut queue, false).expect("plan");
        let record = runs.iter().next().expect("record");
        assert_eq!(record.data_in.user, "sweepuser");
        assert_eq!(record.data_in.db, "aug");
        assert_eq!(record.data_in.shot, 94875);
    }
}
