//! Iteration observers.
//!
//! An observer is a closure the engine calls after every optimizer step.
//! The standard ones print to stdout, append to an iteration file or record
//! the metric history.

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

/// State reported after one optimizer step.
#[derive(Debug, Clone)]
pub struct IterationEvent<'a> {
    /// Zero-based iteration within the current run.
    pub iteration: usize,
    /// Metric value at the parameters the step started from.
    pub value: f64,
    /// Parameters after the step.
    pub parameters: &'a [f64],
    pub step_length: f64,
    pub elapsed: Duration,
}

pub type Observer = Box<dyn FnMut(&IterationEvent<'_>)>;

/// `iter = value : [p0, p1, …]`
pub fn format_stdout(event: &IterationEvent<'_>) -> String {
    let parameters: Vec<String> = event.parameters.iter().map(|p| p.to_string()).collect();
    format!("{} = {} : [{}]", event.iteration, event.value, parameters.join(", "))
}

/// `iter value p0 p1 …`
pub fn format_line(event: &IterationEvent<'_>) -> String {
    let mut fields = vec![event.iteration.to_string(), event.value.to_string()];
    fields.extend(event.parameters.iter().map(|p| p.to_string()));
    fields.join(" ")
}

/// Print every iteration to stdout.
pub fn stdout_observer() -> Observer {
    Box::new(|event| println!("{}", format_stdout(event)))
}

/// Write every iteration as one line of `path`, truncating it first.
///
/// Write failures are logged and do not stop the registration.
pub fn file_observer(path: &Path) -> std::io::Result<Observer> {
    let mut writer = BufWriter::new(File::create(path)?);
    let target = path.display().to_string();
    Ok(Box::new(move |event| {
        let written = writeln!(writer, "{}", format_line(event)).and_then(|_| writer.flush());
        if let Err(err) = written {
            tracing::warn!("could not write iteration {} to {}: {}", event.iteration, target, err);
        }
    }))
}

/// Shared record of `(iteration, value)` pairs.
#[derive(Debug, Clone, Default)]
pub struct MetricHistory {
    values: Rc<RefCell<Vec<(usize, f64)>>>,
}

impl MetricHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// An observer appending to this history.
    pub fn observer(&self) -> Observer {
        let values = Rc::clone(&self.values);
        Box::new(move |event| values.borrow_mut().push((event.iteration, event.value)))
    }

    pub fn values(&self) -> Vec<(usize, f64)> {
        self.values.borrow().clone()
    }

    pub fn clear(&self) {
        self.values.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(parameters: &[f64]) -> IterationEvent<'_> {
        IterationEvent {
            iteration: 3,
            value: -0.5,
            parameters,
            step_length: 0.1,
            elapsed: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_formats() {
        let e = event(&[1.0, 2.5]);
        assert_eq!(format_stdout(&e), "3 = -0.5 : [1, 2.5]");
        assert_eq!(format_line(&e), "3 -0.5 1 2.5");
    }

    #[test]
    fn test_file_observer_writes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iterations.txt");
        let mut observer = file_observer(&path).unwrap();
        observer(&event(&[1.0]));
        observer(&event(&[2.0]));
        drop(observer);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "3 -0.5 1\n3 -0.5 2\n");
    }

    #[test]
    fn test_history_records_values() {
        let history = MetricHistory::new();
        let mut observer = history.observer();
        observer(&event(&[0.0]));
        assert_eq!(history.values(), vec![(3, -0.5)]);
        history.clear();
        assert!(history.values().is_empty());
    }
}
