mod common;

use common::{memory_handler, task_handler_config, task_instance, BASE_FORMAT};
use std::thread;
use tasklog_core::{
    Handler, LoggerConfig, LoggingConfig, LoggingPipeline, MemoryBuffer, PlainFormatter,
    PrefixFormatter, SharedPipeline, Sink, TaskLogError, TemplateError, TASK_HANDLER, TASK_LOGGER,
};

const TEMPLATE: &str = "{{ti.dag_id}}-{{ti.task_id}}";
const PREFIX_KEY: (&str, &str) = ("logging", "task_log_prefix_template");

fn pipeline_with_template(config: &mut LoggingConfig, template: &str) -> LoggingPipeline {
    let config = config
        .override_vars(&[(PREFIX_KEY, Some(template))])
        .unwrap();
    LoggingPipeline::from_config(&config).unwrap()
}

#[test]
fn test_formatter() {
    let mut config = task_handler_config();
    let mut pipeline = pipeline_with_template(&mut config, TEMPLATE);
    let ti = task_instance("test_dag", "test_task");

    let handler = pipeline.handler(TASK_HANDLER).unwrap();
    let expected = format!("test_dag-test_task:{}", handler.formatter().format_string());
    assert_eq!(expected, "test_dag-test_task:%(asctime)s %(message)s");

    pipeline.set_context(TASK_LOGGER, &ti).unwrap();

    let handler = pipeline.handler(TASK_HANDLER).unwrap();
    assert_eq!(handler.formatter().format_string(), expected);
}

#[test]
fn test_set_context_is_idempotent() {
    let mut config = task_handler_config();
    let mut pipeline = pipeline_with_template(&mut config, TEMPLATE);
    let ti = task_instance("test_dag", "test_task");

    pipeline.set_context(TASK_LOGGER, &ti).unwrap();
    let once = pipeline
        .handler(TASK_HANDLER)
        .unwrap()
        .formatter()
        .format_string()
        .to_string();
    pipeline.set_context(TASK_LOGGER, &ti).unwrap();

    assert_eq!(
        pipeline.handler(TASK_HANDLER).unwrap().formatter().format_string(),
        once
    );
}

#[test]
fn test_new_context_replaces_prefix() {
    let mut config = task_handler_config();
    let mut pipeline = pipeline_with_template(&mut config, TEMPLATE);

    pipeline
        .set_context(TASK_LOGGER, &task_instance("dag_one", "first"))
        .unwrap();
    pipeline
        .set_context(TASK_LOGGER, &task_instance("dag_two", "second"))
        .unwrap();

    let fmt = pipeline
        .handler(TASK_HANDLER)
        .unwrap()
        .formatter()
        .format_string()
        .to_string();
    assert_eq!(fmt, format!("dag_two-second:{BASE_FORMAT}"));
    assert!(!fmt.contains("dag_one-first"));
}

#[test]
fn test_override_restored_after_scope() {
    let mut config = task_handler_config();
    assert!(config.logging.task_log_prefix_template.is_none());

    let pipeline = pipeline_with_template(&mut config, TEMPLATE);
    assert_eq!(pipeline.prefix_template().unwrap().as_str(), TEMPLATE);

    assert!(config.logging.task_log_prefix_template.is_none());
    assert_eq!(config, task_handler_config());
}

#[test]
fn test_handler_lookup() {
    let pipeline = LoggingPipeline::from_config(&task_handler_config()).unwrap();
    assert_eq!(pipeline.handler(TASK_HANDLER).unwrap().name(), TASK_HANDLER);

    let mut config = task_handler_config();
    config.handlers.remove(TASK_HANDLER);
    config.loggers.remove(TASK_LOGGER);
    let pipeline = LoggingPipeline::from_config(&config).unwrap();

    let err = pipeline.handler(TASK_HANDLER).unwrap_err();
    assert!(matches!(err, TaskLogError::HandlerNotFound { ref name } if name == "task"));
    assert_eq!(err.to_string(), "Handler not found: 'task'");
}

#[test]
fn test_plain_handlers_are_skipped() {
    let mut config = task_handler_config();
    config
        .handlers
        .insert("plain".to_string(), memory_handler("airflow", false));
    config
        .loggers
        .get_mut(TASK_LOGGER)
        .unwrap()
        .handlers
        .push("plain".to_string());
    let mut pipeline = pipeline_with_template(&mut config, TEMPLATE);

    pipeline
        .set_context(TASK_LOGGER, &task_instance("test_dag", "test_task"))
        .unwrap();

    assert_eq!(
        pipeline.handler("plain").unwrap().formatter().format_string(),
        BASE_FORMAT
    );
    assert_eq!(
        pipeline.handler(TASK_HANDLER).unwrap().formatter().format_string(),
        format!("test_dag-test_task:{BASE_FORMAT}")
    );
}

#[test]
fn test_unresolved_placeholder_leaves_formatters_unchanged() {
    let mut config = task_handler_config();
    let mut pipeline = pipeline_with_template(&mut config, "{{ti.dag_id}}-{{ti.owner}}");

    let err = pipeline
        .set_context(TASK_LOGGER, &task_instance("test_dag", "test_task"))
        .unwrap_err();

    assert!(matches!(
        err,
        TaskLogError::Template(TemplateError::UnresolvedPlaceholder { ref placeholder })
            if placeholder == "ti.owner"
    ));
    assert_eq!(
        pipeline.handler(TASK_HANDLER).unwrap().formatter().format_string(),
        BASE_FORMAT
    );
}

#[test]
fn test_raw_instance_is_skipped() {
    let mut config = task_handler_config();
    let mut pipeline = pipeline_with_template(&mut config, TEMPLATE);
    let ti = task_instance("test_dag", "test_task").raw(true);

    pipeline.set_context(TASK_LOGGER, &ti).unwrap();

    assert_eq!(
        pipeline.handler(TASK_HANDLER).unwrap().formatter().format_string(),
        BASE_FORMAT
    );
}

#[test]
fn test_without_template_resets_to_base() {
    let mut config = task_handler_config();
    let mut pipeline = pipeline_with_template(&mut config, TEMPLATE);
    pipeline
        .set_context(TASK_LOGGER, &task_instance("test_dag", "test_task"))
        .unwrap();

    pipeline.set_prefix_template(None);
    pipeline
        .set_context(TASK_LOGGER, &task_instance("test_dag", "test_task"))
        .unwrap();

    assert_eq!(
        pipeline.handler(TASK_HANDLER).unwrap().formatter().format_string(),
        BASE_FORMAT
    );
}

#[test]
fn test_blank_template_in_config_means_no_prefix() {
    let mut config = task_handler_config();
    let mut pipeline = pipeline_with_template(&mut config, "  ");
    assert!(pipeline.prefix_template().is_none());

    pipeline
        .set_context(TASK_LOGGER, &task_instance("test_dag", "test_task"))
        .unwrap();
    assert_eq!(
        pipeline.handler(TASK_HANDLER).unwrap().formatter().format_string(),
        BASE_FORMAT
    );
}

#[test]
fn test_prefix_reaches_parent_logger_handlers() {
    let mut config = task_handler_config();
    config
        .handlers
        .insert("parent".to_string(), memory_handler("airflow", true));
    config.loggers.insert(
        "airflow".to_string(),
        LoggerConfig {
            handlers: vec!["parent".to_string()],
            level: None,
            propagate: false,
        },
    );
    config.loggers.get_mut(TASK_LOGGER).unwrap().propagate = true;
    let mut pipeline = pipeline_with_template(&mut config, TEMPLATE);

    let ti = task_instance("test_dag", "test_task");
    pipeline.set_context("airflow.task.hooks", &ti).unwrap();

    assert_eq!(
        pipeline.handler_chain("airflow.task.hooks").unwrap(),
        vec![TASK_HANDLER.to_string(), "parent".to_string()]
    );
    assert_eq!(
        pipeline.handler("parent").unwrap().formatter().format_string(),
        format!("test_dag-test_task:{BASE_FORMAT}")
    );
    // root's console handler sits past a non-propagating logger
    assert_eq!(
        pipeline.handler("console").unwrap().formatter().format_string(),
        BASE_FORMAT
    );
}

#[test]
fn test_propagation_stops_at_non_propagating_logger() {
    let mut config = task_handler_config();
    config
        .handlers
        .insert("parent".to_string(), memory_handler("airflow", true));
    config.loggers.insert(
        "airflow".to_string(),
        LoggerConfig {
            handlers: vec!["parent".to_string()],
            level: None,
            propagate: true,
        },
    );
    let mut pipeline = pipeline_with_template(&mut config, TEMPLATE);

    pipeline
        .set_context(TASK_LOGGER, &task_instance("test_dag", "test_task"))
        .unwrap();

    assert_eq!(
        pipeline.handler("parent").unwrap().formatter().format_string(),
        BASE_FORMAT
    );
}

#[test]
fn test_unknown_logger() {
    let mut pipeline = LoggingPipeline::from_config(&task_handler_config()).unwrap();
    let err = pipeline
        .set_context("scheduler", &task_instance("test_dag", "test_task"))
        .unwrap_err();
    assert!(matches!(err, TaskLogError::LoggerNotFound { ref name } if name == "scheduler"));
}

#[test]
fn test_run_scope_logs_with_prefix_and_resets() {
    let mut config = task_handler_config();
    config
        .handlers
        .insert(TASK_HANDLER.to_string(), memory_handler("messages", true));
    config.formatters.insert(
        "messages".to_string(),
        tasklog_core::FormatterConfig {
            format: Some("%(levelname)s %(message)s".to_string()),
        },
    );
    let mut pipeline = pipeline_with_template(&mut config, TEMPLATE);

    {
        let run = pipeline
            .begin_run(TASK_LOGGER, &task_instance("test_dag", "test_task"))
            .unwrap();
        run.info("starting").unwrap();
        run.error("boom").unwrap();
    }

    let handler = pipeline.handler(TASK_HANDLER).unwrap();
    assert_eq!(
        handler.captured().unwrap(),
        vec![
            "test_dag-test_task:INFO starting".to_string(),
            "test_dag-test_task:ERROR boom".to_string(),
        ]
    );
    assert_eq!(handler.formatter().format_string(), "%(levelname)s %(message)s");
}

#[test]
fn test_run_scope_records_caller_location() {
    let mut config = task_handler_config();
    config
        .handlers
        .insert(TASK_HANDLER.to_string(), memory_handler("located", true));
    config.formatters.insert(
        "located".to_string(),
        tasklog_core::FormatterConfig {
            format: Some("{%(filename)s:%(lineno)d} %(module)s %(message)s".to_string()),
        },
    );
    let mut pipeline = pipeline_with_template(&mut config, TEMPLATE);

    let run = pipeline
        .begin_run(TASK_LOGGER, &task_instance("test_dag", "test_task"))
        .unwrap();
    let line = line!() + 1;
    run.warn("msg").unwrap();

    assert_eq!(
        run.pipeline().handler(TASK_HANDLER).unwrap().captured().unwrap(),
        vec![format!(
            "test_dag-test_task:{{custom_formatter_test.rs:{line}}} custom_formatter_test msg"
        )]
    );
}

#[test]
fn test_swapped_in_prefix_formatter_receives_context() {
    let mut config = task_handler_config();
    config
        .handlers
        .insert("audit".to_string(), memory_handler("airflow", false));
    config
        .loggers
        .get_mut(TASK_LOGGER)
        .unwrap()
        .handlers
        .push("audit".to_string());
    let mut pipeline = pipeline_with_template(&mut config, TEMPLATE);
    assert_eq!(
        pipeline.handler_names().collect::<Vec<_>>(),
        vec!["audit", "console", TASK_HANDLER]
    );

    let audit = pipeline.handler_mut("audit").unwrap();
    assert!(matches!(audit.sink(), Sink::Memory(_)));
    assert!(audit.formatter().as_prefix().is_none());
    audit.set_formatter(Box::new(PrefixFormatter::new("%(message)s").unwrap()));

    pipeline
        .set_context(TASK_LOGGER, &task_instance("test_dag", "test_task"))
        .unwrap();

    let formatter = pipeline
        .handler("audit")
        .unwrap()
        .formatter()
        .as_prefix()
        .unwrap();
    assert_eq!(formatter.prefix(), Some("test_dag-test_task"));
    assert_eq!(formatter.base_format(), "%(message)s");
    assert_eq!(formatter.effective_format(), "test_dag-test_task:%(message)s");
}

#[test]
fn test_logger_level_filters_records() {
    let mut config = task_handler_config();
    config
        .handlers
        .insert(TASK_HANDLER.to_string(), memory_handler("airflow", true));
    config.loggers.get_mut(TASK_LOGGER).unwrap().level = Some("WARNING".to_string());
    let mut pipeline = pipeline_with_template(&mut config, TEMPLATE);

    let run = pipeline
        .begin_run(TASK_LOGGER, &task_instance("test_dag", "test_task"))
        .unwrap();
    run.info("hidden").unwrap();
    run.warn("shown").unwrap();

    let lines = run.pipeline().handler(TASK_HANDLER).unwrap().captured().unwrap();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("test_dag-test_task:"));
    assert!(lines[0].ends_with(" shown"));
}

#[test]
fn test_shared_pipeline_runs_do_not_mix_prefixes() {
    let mut config = task_handler_config();
    config.handlers.remove(TASK_HANDLER);
    config.loggers.get_mut(TASK_LOGGER).unwrap().handlers.clear();
    let mut pipeline = pipeline_with_template(&mut config, TEMPLATE);

    let buffer = MemoryBuffer::new();
    pipeline.insert_handler(Handler::new(
        TASK_HANDLER,
        Box::new(tasklog_core::PrefixFormatter::new("%(message)s").unwrap()),
        Sink::Memory(buffer.clone()),
    ));
    pipeline.attach(TASK_LOGGER, TASK_HANDLER).unwrap();
    let shared = SharedPipeline::new(pipeline);

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let shared = shared.clone();
            thread::spawn(move || {
                let ti = task_instance("dag", &format!("task_{i}"));
                for n in 0..25 {
                    shared
                        .run(TASK_LOGGER, &ti, |run| run.info(format!("task_{i} line {n}")))
                        .unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let lines = buffer.lines();
    assert_eq!(lines.len(), 100);
    for line in lines {
        let (prefix, message) = line.split_once(':').unwrap();
        let task = prefix.strip_prefix("dag-").unwrap();
        assert!(message.starts_with(&format!("{task} line ")), "mixed line: {line}");
    }

    shared.with(|pipeline| {
        assert_eq!(
            pipeline.handler(TASK_HANDLER).unwrap().formatter().format_string(),
            "%(message)s"
        );
    });
}

#[test]
fn test_attach_requires_registered_handler() {
    let mut pipeline = LoggingPipeline::from_config(&task_handler_config()).unwrap();
    pipeline.insert_handler(Handler::new(
        "extra",
        Box::new(PlainFormatter::new("%(message)s").unwrap()),
        Sink::Memory(MemoryBuffer::new()),
    ));

    assert!(pipeline.attach("airflow.processor", "extra").is_ok());
    assert!(matches!(
        pipeline.attach("airflow.processor", "missing"),
        Err(TaskLogError::HandlerNotFound { .. })
    ));
    assert_eq!(
        pipeline.handler_chain("airflow.processor").unwrap(),
        vec!["extra".to_string(), "console".to_string()]
    );
}
