use crate::batch::Batch;
use crate::error::Result;
use crate::runtime::{expect_done, BoxPuller, Puller};

/// Hands out scan tasks to a [`FromScheduler`] source one at a time.
pub trait Scheduler: Send {
    /// The next task, or `None` once the scan is exhausted
    fn next_task(&mut self) -> Result<Option<BoxPuller>>;
}

impl<F> Scheduler for F
where
    F: FnMut() -> Result<Option<BoxPuller>> + Send,
{
    fn next_task(&mut self) -> Result<Option<BoxPuller>> {
        self()
    }
}

/// Source that drains each scheduled task to EOS before asking for the
/// next one, so tasks are delivered and closed strictly in order.
///
/// The scan is not restartable: once the scheduler runs dry, a done is
/// received or a task fails, every further pull is EOS.
pub struct FromScheduler {
    sched: Box<dyn Scheduler>,
    task: Option<BoxPuller>,
    finished: bool,
}

impl FromScheduler {
    pub fn new(sched: Box<dyn Scheduler>) -> Self {
        Self {
            sched,
            task: None,
            finished: false,
        }
    }

    fn close_task(&mut self) -> Result<()> {
        match self.task.take() {
            Some(mut task) => task.close(),
            None => Ok(()),
        }
    }

    fn next_batch(&mut self) -> Result<Option<Batch>> {
        loop {
            if self.task.is_none() {
                match self.sched.next_task()? {
                    Some(task) => self.task = Some(task),
                    None => return Ok(None),
                }
            }
            let task = match self.task.as_mut() {
                Some(t) => t,
                None => return Ok(None),
            };
            match task.pull(false)? {
                Some(batch) => return Ok(Some(batch)),
                None => {
                    tracing::trace!("from: task reached EOS");
                    self.close_task()?;
                }
            }
        }
    }
}

impl Puller for FromScheduler {
    fn pull(&mut self, done: bool) -> Result<Option<Batch>> {
        if self.finished {
            return Ok(None);
        }
        if done {
            self.finished = true;
            if let Some(task) = self.task.as_mut() {
                expect_done(task.pull(true))?;
            }
            self.close_task()?;
            return Ok(None);
        }
        match self.next_batch() {
            Ok(Some(batch)) => Ok(Some(batch)),
            Ok(None) => {
                self.finished = true;
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                if let Err(close_err) = self.close_task() {
                    tracing::debug!(error = %close_err, "from: closing failed task");
                }
                Err(e)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.close_task()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use super::*;
    use crate::runtime::testing::{drain_ints, ints, Counts, Script, Step};

    struct Tasks(VecDeque<Script>);

    impl Scheduler for Tasks {
        fn next_task(&mut self) -> Result<Option<BoxPuller>> {
            Ok(self.0.pop_front().map(|s| Box::new(s) as BoxPuller))
        }
    }

    fn tasks(scripts: Vec<Vec<Vec<i64>>>) -> (FromScheduler, Vec<Arc<Counts>>) {
        let mut queue = VecDeque::new();
        let mut counts = Vec::new();
        for batches in scripts {
            let (s, c) = Script::batches(batches.iter().map(|b| ints(b)).collect());
            queue.push_back(s);
            counts.push(c);
        }
        (FromScheduler::new(Box::new(Tasks(queue))), counts)
    }

    #[test]
    fn test_from_serialises_tasks() {
        let (mut f, counts) = tasks(vec![vec![vec![1, 2], vec![3]], vec![], vec![vec![4]]]);
        assert_eq!(drain_ints(&mut f), vec![1, 2, 3, 4]);
        for c in &counts {
            assert_eq!(c.closes(), 1);
        }
        // Exhausted scans stay at EOS.
        assert!(f.pull(false).unwrap().is_none());
    }

    #[test]
    fn test_from_done_stops_current_task() {
        let (mut f, counts) = tasks(vec![vec![vec![1], vec![2]], vec![vec![3]]]);
        assert!(f.pull(false).unwrap().is_some());
        assert!(f.pull(true).unwrap().is_none());
        assert_eq!(counts[0].dones(), 1);
        assert_eq!(counts[0].closes(), 1);
        assert_eq!(counts[1].pulls(), 0);
        assert!(f.pull(false).unwrap().is_none());
    }

    #[test]
    fn test_from_task_error() {
        let (s, c) = Script::new(vec![Step::Fail("corrupt".into())]);
        let mut f = FromScheduler::new(Box::new(Tasks(vec![s].into())));
        assert!(f.pull(false).is_err());
        assert_eq!(c.closes(), 1);
        assert!(f.pull(false).unwrap().is_none());
        assert_eq!(c.pulls(), 1);
    }
}
