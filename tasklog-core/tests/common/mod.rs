#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use std::io;
use std::sync::{Arc, Mutex};
use tasklog_core::{
    HandlerConfig, HandlerKind, LoggingConfig, StreamTarget, TaskIdentity, TaskInstance,
    TASK_HANDLER,
};
use tracing_subscriber::fmt::MakeWriter;

pub const BASE_FORMAT: &str = "%(asctime)s %(message)s";

/// Default config with the `task` handler replaced by a prefix-capable
/// stdout handler using the `airflow` formatter.
pub fn task_handler_config() -> LoggingConfig {
    let mut config = LoggingConfig::default();
    config.handlers.insert(
        TASK_HANDLER.to_string(),
        HandlerConfig {
            kind: HandlerKind::Stream,
            formatter: "airflow".to_string(),
            stream: StreamTarget::Stdout,
            path: None,
            level: None,
            task_prefix: true,
        },
    );
    config
        .formatters
        .get_mut("airflow")
        .expect("default airflow formatter")
        .format = Some(BASE_FORMAT.to_string());
    config
}

pub fn memory_handler(formatter: &str, task_prefix: bool) -> HandlerConfig {
    HandlerConfig {
        kind: HandlerKind::Memory,
        formatter: formatter.to_string(),
        stream: StreamTarget::Stdout,
        path: None,
        level: None,
        task_prefix,
    }
}

pub fn task_instance(dag_id: &str, task_id: &str) -> TaskInstance {
    TaskInstance::new(TaskIdentity::new(dag_id, task_id), "manual__2019-01-01T00:00:00+00:00")
        .with_logical_date(Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap())
}

/// `MakeWriter` collecting everything written into a shared buffer.
#[derive(Clone, Default)]
pub struct CaptureWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl CaptureWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8(self.buf.lock().unwrap().clone()).unwrap()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

pub struct CaptureHandle {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CaptureHandle {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CaptureWriter {
    type Writer = CaptureHandle;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureHandle {
            buf: self.buf.clone(),
        }
    }
}
