use crate::{
    configuration::Settings, domain::PayerEmail, email_client::EmailClient,
    startup::get_pg_connection_pool,
};
use sqlx::{postgres::PgRow, Executor, PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use tracing::Span;
use uuid::Uuid;

pub async fn run_delivery_worker_until_stopped(config: Settings) -> Result<(), anyhow::Error> {
    let connection_pool = get_pg_connection_pool(&config.database);
    let email_client = config.email_client.client();
    let base_url = config.application.base_url.clone();
    worker_loop(&connection_pool, &email_client, &base_url).await
}

async fn worker_loop(
    db_pool: &PgPool,
    email_client: &EmailClient,
    base_url: &str,
) -> Result<(), anyhow::Error> {
    loop {
        match try_execute_task(db_pool, email_client, base_url).await {
            Ok(ExecutionOutcome::TaskCompleted) => {}
            Ok(ExecutionOutcome::EmptyQueue) => tokio::time::sleep(Duration::from_secs(10)).await,
            Err(_) => tokio::time::sleep(Duration::from_secs(1)).await,
        }
    }
}

#[tracing::instrument(
    skip_all,
    fields(
        task_id=tracing::field::Empty,
        recipient=tracing::field::Empty),
    err
)]
pub async fn try_execute_task(
    db_pool: &PgPool,
    email_client: &EmailClient,
    base_url: &str,
) -> Result<ExecutionOutcome, anyhow::Error> {
    if let Some((transaction, task)) = dequeue_task(db_pool).await? {
        Span::current()
            .record("task_id", task.id.to_string())
            .record("recipient", task.recipient.clone());

        match PayerEmail::parse(task.recipient.clone()) {
            Ok(recipient) => {
                let share_url = format!("{base_url}/love/{}", task.letter_slug);
                let (subject, html_content, text_content) =
                    confirmation_email(&task.recipient_name, &share_url);

                if let Err(e) = email_client
                    .send_email(&recipient, &subject, &html_content, &text_content)
                    .await
                {
                    tracing::error!(
                        error_cause_chain = ?e,
                        error.message = %e,
                        "Failed to deliver the confirmation email. Skipping."
                    );
                }
            }
            Err(e) => {
                tracing::error!(
                    error_cause_chain = ?e,
                    error.message = %e,
                    "Failed to deliver the confirmation email. \
                    The stored recipient address is invalid."
                );
            }
        }

        delete_task(transaction, task.id).await?;

        Ok(ExecutionOutcome::TaskCompleted)
    } else {
        Ok(ExecutionOutcome::EmptyQueue)
    }
}

type PgTransaction = Transaction<'static, Postgres>;

struct OutboxTask {
    id: Uuid,
    recipient: String,
    recipient_name: String,
    letter_slug: String,
}

#[tracing::instrument(skip_all)]
async fn dequeue_task(
    db_pool: &PgPool,
) -> Result<Option<(PgTransaction, OutboxTask)>, anyhow::Error> {
    let mut transaction = db_pool.begin().await?;
    let query = sqlx::query(
        r#"
        SELECT id, recipient, recipient_name, letter_slug
        FROM email_outbox
        FOR UPDATE
        SKIP LOCKED
        LIMIT 1
        "#,
    );

    match transaction.fetch_optional(query).await? {
        Some(row) => {
            let task = decode_task(&row)?;
            Ok(Some((transaction, task)))
        }
        None => Ok(None),
    }
}

fn decode_task(row: &PgRow) -> Result<OutboxTask, anyhow::Error> {
    Ok(OutboxTask {
        id: row.try_get("id")?,
        recipient: row.try_get("recipient")?,
        recipient_name: row.try_get("recipient_name")?,
        letter_slug: row.try_get("letter_slug")?,
    })
}

#[tracing::instrument(skip_all)]
async fn delete_task(mut transaction: PgTransaction, task_id: Uuid) -> Result<(), anyhow::Error> {
    let query = sqlx::query(
        r#"
        DELETE FROM email_outbox
        WHERE id = $1
        "#,
    )
    .bind(task_id);

    transaction.execute(query).await?;
    transaction.commit().await?;

    Ok(())
}

fn confirmation_email(recipient_name: &str, share_url: &str) -> (String, String, String) {
    let subject = "Pagamento confirmado! Sua carta está pronta".to_string();
    let html_content = format!(
        "<h2>Olá, {recipient_name}!</h2>\
         <p>Seu pagamento foi confirmado e sua carta de amor está pronta para ser \
         compartilhada!</p>\
         <p><a href=\"{share_url}\">Ver Minha Carta</a></p>\
         <p>Com carinho,<br/>Equipe LoveYuu</p>"
    );
    let text_content = format!(
        "Olá, {recipient_name}!\n\
         Seu pagamento foi confirmado e sua carta de amor está pronta: {share_url}\n\
         Com carinho, Equipe LoveYuu"
    );

    (subject, html_content, text_content)
}

pub enum ExecutionOutcome {
    TaskCompleted,
    EmptyQueue,
}
