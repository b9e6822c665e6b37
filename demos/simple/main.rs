use std::collections::HashMap;

use flagkit::{
    AssignmentEvent, AssignmentLogger, BanditEvent, BanditLogger, ContextAttributes, LoggerError,
};

struct StdoutLogger;

impl AssignmentLogger for StdoutLogger {
    fn log_assignment(&self, event: AssignmentEvent) -> Result<(), LoggerError> {
        println!("Logging assignment event: {}", serde_json::to_string(&event)?);
        Ok(())
    }

    fn as_bandit_logger(&self) -> Option<&dyn BanditLogger> {
        Some(self)
    }
}

impl BanditLogger for StdoutLogger {
    fn log_bandit_action(&self, event: BanditEvent) -> Result<(), LoggerError> {
        println!("Logging bandit event: {}", serde_json::to_string(&event)?);
        Ok(())
    }
}

pub fn main() -> flagkit::Result<()> {
    // Configure env_logger to see flagkit logs.
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("flagkit")).init();

    let api_key = std::env::var("FLAGKIT_API_KEY")
        .expect("FLAGKIT_API_KEY env variable should contain API key");
    let mut client = flagkit::ClientConfig::from_api_key(api_key)
        .assignment_logger(StdoutLogger)
        .to_client();

    // Start a poller thread to fetch configuration from the server.
    let poller = client.start_poller_thread()?;

    // Block waiting for configuration. Until this call returns, the client will return defaults
    // for all assignments.
    if let Err(err) = poller.wait_for_configuration() {
        println!("error requesting configuration: {:?}", err);
    }

    // Get assignment for test-subject.
    let assignment = client.get_boolean_assignment(
        "a-boolean-flag",
        "test-subject",
        &HashMap::new(),
        false,
    )?;
    println!(
        "Assignment: {:?} (default used because of: {:?})",
        assignment.value, assignment.error
    );

    let subject = ContextAttributes {
        numeric: HashMap::from([("age".to_owned(), 30.0)]),
        categorical: HashMap::from([("country".to_owned(), "US".to_owned())]),
    };
    let actions = HashMap::from([
        ("nike".to_owned(), ContextAttributes::default()),
        ("adidas".to_owned(), ContextAttributes::default()),
    ]);
    let result = client.get_bandit_action(
        "a-bandit-flag",
        "test-subject",
        &subject,
        &actions,
        "control",
    )?;
    println!("Bandit: variation={} action={:?}", result.variation, result.action);

    poller.shutdown()
}
