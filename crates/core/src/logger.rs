use std::sync::Mutex;

/// Narrow logging capability handed to the executor and actions per call.
pub trait PatchLogger: Send + Sync {
    fn info(&self, msg: &str);
    fn error(&self, msg: &str);
}

/// Forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl PatchLogger for TracingLogger {
    fn info(&self, msg: &str) { tracing::info!("{}", msg); }
    fn error(&self, msg: &str) { tracing::error!("{}", msg); }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl PatchLogger for NoopLogger {
    fn info(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
}

/// Keeps every line in memory; handy for asserting on log output.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    lines: Mutex<Vec<(Level, String)>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level { Info, Error }

impl RecordingLogger {
    pub fn new() -> Self { Self::default() }

    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn infos(&self) -> Vec<String> { self.at(Level::Info) }

    pub fn errors(&self) -> Vec<String> { self.at(Level::Error) }

    fn at(&self, level: Level) -> Vec<String> {
        self.lines().into_iter().filter(|(l, _)| *l == level).map(|(_, m)| m).collect()
    }

    fn push(&self, level: Level, msg: &str) {
        if let Ok(mut l) = self.lines.lock() { l.push((level, msg.to_string())); }
    }
}

impl PatchLogger for RecordingLogger {
    fn info(&self, msg: &str) { self.push(Level::Info, msg); }
    fn error(&self, msg: &str) { self.push(Level::Error, msg); }
}
