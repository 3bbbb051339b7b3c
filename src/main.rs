use loveyuu::{
    configuration::get_configuration,
    email_delivery_worker::run_delivery_worker_until_stopped,
    startup::Application,
    telemetry::{get_subscriber, init_subscriber},
    upload_expiry_worker::run_expiry_worker_until_stopped,
};
use std::fmt::{Debug, Display};
use tokio::task::JoinError;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let subscriber = get_subscriber("loveyuu".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber);

    let config = get_configuration().expect("Failed to read configuration");

    let application = Application::build(config.clone()).await?;
    let application_task = tokio::spawn(application.run_until_stopped());
    let delivery_worker_task = tokio::spawn(run_delivery_worker_until_stopped(config.clone()));
    let expiry_worker_task = tokio::spawn(run_expiry_worker_until_stopped(config));

    tokio::select! {
        outcome = application_task => report_exit("API", outcome),
        outcome = delivery_worker_task => report_exit("Email delivery worker", outcome),
        outcome = expiry_worker_task => report_exit("Upload expiry worker", outcome),
    };

    Ok(())
}

fn report_exit<E>(task_name: &str, outcome: Result<Result<(), E>, JoinError>)
where
    E: Debug + Display,
{
    match outcome {
        Ok(Ok(())) => tracing::info!("{task_name} has exited"),
        Ok(Err(e)) => {
            tracing::error!(
                error_cause_chain = ?e,
                error.message = %e,
                "{task_name} failed"
            )
        }
        Err(e) => {
            tracing::error!(
                error_cause_chain = ?e,
                error.message = %e,
                "{task_name} task failed to complete"
            )
        }
    }
}
