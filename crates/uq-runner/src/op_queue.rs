use anyhow::{Context, Result};
use tracing::info;

/// A deferred side-effecting operation: a human-readable description plus
/// the action itself.
pub struct Op<'a> {
    description: String,
    action: Box<dyn FnOnce() -> Result<()> + 'a>,
}

/// Collects side effects instead of performing them. In dry-run mode the
/// queue only reports what it would have done; otherwise `apply_all`
/// executes the operations in insertion order.
pub struct OpQueue<'a> {
    ops: Vec<Op<'a>>,
    dry_run: bool,
}

impl<'a> OpQueue<'a> {
    pub fn new(dry_run: bool) -> Self {
        Self {
            ops: Vec::new(),
            dry_run,
        }
    }

    pub fn push<F>(&mut self, description: impl Into<String>, action: F)
    where
        F: FnOnce() -> Result<()> + 'a,
    {
        self.ops.push(Op {
            description: description.into(),
            action: Box::new(action),
        });
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn descriptions(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().map(|op| op.description.as_str())
    }

    /// Run every queued operation, or only report them in dry-run mode.
    /// Returns the number of operations executed.
    pub fn apply_all(self) -> Result<usize> {
        if self.dry_run {
            for op in &self.ops {
                info!("dry-run: {}", op.description);
            }
            return Ok(0);
        }
        let count = self.ops.len();
        for op in self.ops {
            info!("{}", op.description);
            (op.action)().with_context(|| op.description.clone())?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn apply_runs_operations_in_insertion_order() {
        let log = std::cell::RefCell::new(Vec::new());
        let mut queue = OpQueue::new(false);
        queue.push("first", || {
            log.borrow_mut().push(1);
            Ok(())
        });
        queue.push("second", || {
            log.borrow_mut().push(2);
            Ok(())
        });
        let executed = queue.apply_all().expect("apply");
        assert_eq!(executed, 2);
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn dry_run_collects_but_never_executes() {
        let ran = Cell::new(false);
        let mut queue = OpQueue::new(true);
        queue.push("would touch the filesystem", || {
            ran.set(true);
            Ok(())
        });
        assert!(queue.is_dry_run());
        assert_eq!(queue.len(), 1);
        assert_eq!(
            queue.descriptions().collect::<Vec<_>>(),
            vec!["would touch the filesystem"]
        );
        let executed = queue.apply_all().expect("apply");
        assert_eq!(executed, 0);
        assert!(!ran.get());
    }

    #[test]
    fn failures_carry_the_operation_description() {
        let mut queue = OpQueue::new(false);
        queue.push("doomed op", || anyhow::bail!("boom"));
        let err = queue.apply_all().expect_err("err");
        assert!(format!("{:#}", err).contains("doomed op"));
    }
}
