//! # Task Execution Context
//!
//! Identity of a task and the runtime data of one of its runs. The prefix
//! template is resolved against these values through [`TemplateContext`].

use chrono::{DateTime, Utc};

/// Resolves dotted placeholder paths (`ti.dag_id`, `run_id`, ...) to text.
pub trait TemplateContext {
    fn lookup(&self, path: &str) -> Option<String>;
}

/// Owning workflow and task id. Fixed when the task is defined.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskIdentity {
    dag_id: String,
    task_id: String,
}

impl TaskIdentity {
    pub fn new(dag_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            dag_id: dag_id.into(),
            task_id: task_id.into(),
        }
    }

    pub fn dag_id(&self) -> &str {
        &self.dag_id
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

/// One execution of a task.
///
/// Created when a run starts and dropped once logging for that run ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInstance {
    identity: TaskIdentity,
    run_id: String,
    try_number: u32,
    /// -1 for unmapped tasks
    map_index: i32,
    logical_date: DateTime<Utc>,
    /// Inner process of a task whose output is already captured by its parent.
    raw: bool,
}

impl TaskInstance {
    pub fn new(identity: TaskIdentity, run_id: impl Into<String>) -> Self {
        Self {
            identity,
            run_id: run_id.into(),
            try_number: 1,
            map_index: -1,
            logical_date: Utc::now(),
            raw: false,
        }
    }

    pub fn with_try_number(mut self, try_number: u32) -> Self {
        self.try_number = try_number;
        self
    }

    pub fn with_map_index(mut self, map_index: i32) -> Self {
        self.map_index = map_index;
        self
    }

    pub fn with_logical_date(mut self, logical_date: DateTime<Utc>) -> Self {
        self.logical_date = logical_date;
        self
    }

    pub fn raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    pub fn identity(&self) -> &TaskIdentity {
        &self.identity
    }

    pub fn dag_id(&self) -> &str {
        self.identity.dag_id()
    }

    pub fn task_id(&self) -> &str {
        self.identity.task_id()
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn try_number(&self) -> u32 {
        self.try_number
    }

    pub fn map_index(&self) -> i32 {
        self.map_index
    }

    pub fn logical_date(&self) -> DateTime<Utc> {
        self.logical_date
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "dag_id" => Some(self.dag_id().to_string()),
            "task_id" => Some(self.task_id().to_string()),
            "run_id" => Some(self.run_id.clone()),
            "try_number" => Some(self.try_number.to_string()),
            "map_index" => Some(self.map_index.to_string()),
            "logical_date" | "execution_date" => Some(self.logical_date.to_rfc3339()),
            _ => None,
        }
    }
}

impl TemplateContext for TaskInstance {
    fn lookup(&self, path: &str) -> Option<String> {
        match path.split_once('.') {
            Some(("ti" | "task_instance", field)) => self.field(field),
            Some(_) => None,
            None => match path {
                "ds" => Some(self.logical_date.format("%Y-%m-%d").to_string()),
                "ts" => Some(self.logical_date.to_rfc3339()),
                other => self.field(other),
            },
        }
    }
}
