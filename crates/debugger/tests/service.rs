use debugger::{
    DataTip, DebugAdapterService, ManagedRuntime, SessionError, SessionOptions, SessionState,
};
use eyre::{OptionExt, Result};
use launch_configuration::LaunchContext;

#[ctor::ctor]
fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let _ = color_eyre::install();
}

const TWO_CONFIGURATIONS: &str = r#"{
    // comments are allowed
    "configurations": [
        {"name": "Web", "type": "node", "request": "launch", "$adapter": "adapters/missing-adapter"},
        {"name": "Tests", "type": "node", "request": "launch", "$adapter": "adapters/missing-adapter"}
    ]
}"#;

fn service() -> DebugAdapterService {
    DebugAdapterService::new(SessionOptions::default(), ManagedRuntime::new(None))
}

#[test]
fn configurations_and_active_selection() -> Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("launch.json"), TWO_CONFIGURATIONS)?;
    let context = LaunchContext::new(dir.path().join("index.js"));
    let service = service();

    let names: Vec<_> = service
        .configurations(&context)
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    assert_eq!(names, ["None", "Web", "Tests"]);
    let active = service
        .active_configuration(&context, false)
        .ok_or_eyre("no active configuration")?;
    assert_eq!(active.name(), "Web");

    assert!(service.set_active_configuration("tests", &context));
    let active = service
        .active_configuration(&context, false)
        .ok_or_eyre("no active configuration")?;
    assert_eq!(active.name(), "Tests");

    assert!(!service.set_active_configuration("Missing", &context));
    assert!(service.set_active_configuration("none", &context));
    assert!(service.active_configuration(&context, false).is_none());
    assert!(service.active_configuration(&context, true).is_some());
    Ok(())
}

#[test]
fn expressions_need_an_active_configuration() -> Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("launch.json"), TWO_CONFIGURATIONS)?;
    let context = LaunchContext::new(dir.path().join("index.js"));
    let service = service();

    let text = "console.log(answer);";
    assert_eq!(
        service.resolve_expression(&context, text, 14),
        Some(DataTip {
            span: 12..18,
            expression: "answer".to_string(),
        })
    );
    assert_eq!(service.resolve_expression(&context, text, 19), None);

    service.set_active_configuration("None", &context);
    assert_eq!(service.resolve_expression(&context, text, 14), None);

    let elsewhere = tempfile::tempdir()?;
    let unconfigured = LaunchContext::new(elsewhere.path().join("index.js"));
    assert_eq!(service.resolve_expression(&unconfigured, text, 14), None);
    Ok(())
}

#[test]
fn launching_a_missing_adapter_fails() -> Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("launch.json"), TWO_CONFIGURATIONS)?;
    let context = LaunchContext::new(dir.path().join("index.js"));
    let service = service();

    match service.launch_active(&context) {
        Err(SessionError::Transport(transport::Error::LaunchFailure { command, .. })) => {
            assert_eq!(command, dir.path().join("adapters").join("missing-adapter"));
        }
        other => panic!("expected a launch failure, got {:?}", other.map(|s| s.state())),
    }

    let session = service.current_session().ok_or_eyre("no current session")?;
    assert_eq!(session.state(), SessionState::Terminated);

    service.stop();
    assert!(service.current_session().is_none());
    Ok(())
}

#[test]
fn launching_without_configuration() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let context = LaunchContext::new(dir.path().join("index.js"));
    let service = service();

    let result = service.launch_active(&context);
    assert!(matches!(
        result,
        Err(SessionError::NoActiveConfiguration(ref file)) if *file == dir.path().join("index.js")
    ));

    std::fs::write(dir.path().join("launch.json"), TWO_CONFIGURATIONS)?;
    let none = service
        .configurations(&context)
        .get(0)
        .cloned()
        .ok_or_eyre("empty list")?;
    assert!(matches!(
        service.launch(&none, &context),
        Err(SessionError::Configuration(_))
    ));
    assert!(service.current_session().is_none());
    Ok(())
}
