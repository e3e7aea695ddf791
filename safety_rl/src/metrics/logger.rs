//! Training loggers.
//!
//! The tabular engine emits one snapshot per episode and the actor-critic
//! loop one per optimizer update. Backends decide how often to print.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

/// Training snapshot for logging.
#[derive(Debug, Clone)]
pub struct TrainingSnapshot {
    /// Episode (tabular) or optimizer update (actor-critic) index.
    pub step: usize,
    /// Total environment steps.
    pub env_steps: u64,
    /// Average reward of the last episode.
    pub avg_reward: f32,
    /// SBE outcome of the last episode.
    pub outcome: f32,
    /// Current learning rate.
    pub learning_rate: f64,
    /// Current exploration rate.
    pub epsilon: f64,
    /// Current discount.
    pub gamma: f64,
    /// Critic loss (actor-critic only).
    pub critic_loss: Option<f32>,
    /// Actor loss (actor-critic only).
    pub actor_loss: Option<f32>,
}

impl TrainingSnapshot {
    /// Create a new training snapshot.
    pub fn new(step: usize, env_steps: u64, avg_reward: f32, outcome: f32) -> Self {
        Self {
            step,
            env_steps,
            avg_reward,
            outcome,
            learning_rate: 0.0,
            epsilon: 0.0,
            gamma: 0.0,
            critic_loss: None,
            actor_loss: None,
        }
    }

    /// Set schedule values.
    pub fn with_schedules(mut self, learning_rate: f64, epsilon: f64, gamma: f64) -> Self {
        self.learning_rate = learning_rate;
        self.epsilon = epsilon;
        self.gamma = gamma;
        self
    }

    /// Set loss values.
    pub fn with_losses(mut self, critic_loss: f32, actor_loss: Option<f32>) -> Self {
        self.critic_loss = Some(critic_loss);
        self.actor_loss = actor_loss;
        self
    }
}

/// Logger trait for different logging backends.
pub trait MetricsLogger: Send {
    /// Log a training snapshot.
    fn log(&mut self, snapshot: &TrainingSnapshot);

    /// Flush any buffered output.
    fn flush(&mut self);
}

fn fmt_opt(x: Option<f32>) -> String {
    x.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "-".into())
}

/// Console logger with fixed-width columns.
pub struct ConsoleLogger {
    log_interval: usize,
    last_log_step: Option<usize>,
    start_time: Instant,
    show_header: bool,
}

impl ConsoleLogger {
    /// Create a new console logger.
    ///
    /// # Arguments
    ///
    /// * `log_interval` - Steps between log entries
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
            last_log_step: None,
            start_time: Instant::now(),
            show_header: true,
        }
    }

    /// Reset the start time.
    pub fn reset_timer(&mut self) {
        self.start_time = Instant::now();
    }

    fn due(&self, step: usize) -> bool {
        match self.last_log_step {
            None => true,
            Some(last) => step >= last + self.log_interval,
        }
    }

    fn print_header(&self) {
        println!(
            "{:>8} {:>10} {:>9} {:>9} {:>8} {:>8} {:>10} {:>9} {:>9} {:>8}",
            "Step", "EnvSteps", "Reward", "Outcome", "Alpha", "Eps", "Gamma", "Critic", "Actor", "SPS"
        );
        println!("{}", "-".repeat(98));
    }
}

impl MetricsLogger for ConsoleLogger {
    fn log(&mut self, snapshot: &TrainingSnapshot) {
        if !self.due(snapshot.step) {
            return;
        }

        if self.show_header {
            self.print_header();
            self.show_header = false;
        }

        let elapsed = self.start_time.elapsed().as_secs_f32();
        let sps = if elapsed > 0.0 {
            snapshot.env_steps as f32 / elapsed
        } else {
            0.0
        };

        println!(
            "{:>8} {:>10} {:>9.4} {:>9.4} {:>8.5} {:>8.4} {:>10.6} {:>9} {:>9} {:>8.0}",
            snapshot.step,
            snapshot.env_steps,
            snapshot.avg_reward,
            snapshot.outcome,
            snapshot.learning_rate,
            snapshot.epsilon,
            snapshot.gamma,
            fmt_opt(snapshot.critic_loss),
            fmt_opt(snapshot.actor_loss),
            sps
        );

        self.last_log_step = Some(snapshot.step);
    }

    fn flush(&mut self) {
        // stdout is line-buffered
    }
}

/// CSV file logger, one row per snapshot.
pub struct CsvLogger {
    writer: BufWriter<File>,
    start_time: Instant,
}

impl CsvLogger {
    /// Create a new CSV logger.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the CSV file
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writeln!(
            writer,
            "step,env_steps,avg_reward,outcome,learning_rate,epsilon,gamma,critic_loss,actor_loss,elapsed_secs"
        )?;

        Ok(Self {
            writer,
            start_time: Instant::now(),
        })
    }

    /// Reset the start time.
    pub fn reset_timer(&mut self) {
        self.start_time = Instant::now();
    }
}

impl MetricsLogger for CsvLogger {
    fn log(&mut self, snapshot: &TrainingSnapshot) {
        let elapsed = self.start_time.elapsed().as_secs_f32();
        let critic = snapshot.critic_loss.map(|v| v.to_string()).unwrap_or_default();
        let actor = snapshot.actor_loss.map(|v| v.to_string()).unwrap_or_default();

        if let Err(e) = writeln!(
            self.writer,
            "{},{},{:.6},{:.6},{:.8},{:.6},{:.8},{},{},{:.2}",
            snapshot.step,
            snapshot.env_steps,
            snapshot.avg_reward,
            snapshot.outcome,
            snapshot.learning_rate,
            snapshot.epsilon,
            snapshot.gamma,
            critic,
            actor,
            elapsed
        ) {
            log::warn!("failed to write metrics row: {}", e);
        }
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

impl Drop for CsvLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Multi-logger that writes to multiple backends.
pub struct MultiLogger {
    loggers: Vec<Box<dyn MetricsLogger>>,
}

impl MultiLogger {
    /// Create a new multi-logger.
    pub fn new() -> Self {
        Self {
            loggers: Vec::new(),
        }
    }

    /// Add a logger.
    pub fn add<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }

    /// Number of backends.
    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    /// Whether no backend is attached.
    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}

impl Default for MultiLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsLogger for MultiLogger {
    fn log(&mut self, snapshot: &TrainingSnapshot) {
        for logger in &mut self.loggers {
            logger.log(snapshot);
        }
    }

    fn flush(&mut self) {
        for logger in &mut self.loggers {
            logger.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recording(Arc<Mutex<Vec<usize>>>);

    impl MetricsLogger for Recording {
        fn log(&mut self, snapshot: &TrainingSnapshot) {
            self.0.lock().unwrap().push(snapshot.step);
        }

        fn flush(&mut self) {}
    }

    #[test]
    fn test_training_snapshot() {
        let snapshot = TrainingSnapshot::new(100, 1000, -0.25, 0.5)
            .with_schedules(0.1, 0.05, 0.99)
            .with_losses(0.3, Some(-0.1));

        assert_eq!(snapshot.step, 100);
        assert_eq!(snapshot.env_steps, 1000);
        assert!((snapshot.outcome - 0.5).abs() < 1e-6);
        assert_eq!(snapshot.critic_loss, Some(0.3));
        assert_eq!(snapshot.actor_loss, Some(-0.1));
    }

    #[test]
    fn test_console_logger_interval() {
        let mut logger = ConsoleLogger::new(10);
        assert!(logger.due(0));
        logger.log(&TrainingSnapshot::new(0, 0, 0.0, 0.0));
        assert!(!logger.due(5));
        assert!(logger.due(10));
    }

    #[test]
    fn test_multi_logger_fans_out() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut multi = MultiLogger::new()
            .add(Recording(seen.clone()))
            .add(Recording(seen.clone()));
        assert_eq!(multi.len(), 2);

        multi.log(&TrainingSnapshot::new(3, 30, 0.0, 0.0));
        multi.flush();
        assert_eq!(*seen.lock().unwrap(), vec![3, 3]);
    }

    #[test]
    fn test_csv_logger_writes_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        {
            let mut logger = CsvLogger::new(&path).unwrap();
            logger.log(&TrainingSnapshot::new(1, 10, 0.5, 0.25).with_losses(0.1, None));
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("step,env_steps"));
        assert!(lines[1].starts_with("1,10,"));
    }
}
