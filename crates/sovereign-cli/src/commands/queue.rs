use sovereign_core::util::now_millis;
use sovereign_core::OperationQueue;

use crate::cli::{ActionArg, QueueCommands};
use crate::commands::common::{
    format_operation_lines, operation_to_item, parse_payload, print_json, CliContext,
    OperationItem,
};
use crate::error::CliError;

pub async fn run_queue(context: &CliContext, command: QueueCommands) -> Result<(), CliError> {
    let queue = OperationQueue::new(context.open_store().await?);

    match command {
        QueueCommands::Add {
            action,
            collection,
            id,
            data,
        } => run_queue_add(&queue, action, &collection, id.as_deref(), data.as_deref()).await,
        QueueCommands::List { json } => {
            let operations = queue.list_pending().await?;
            print_operations(&operations, json, "Queue is empty.")
        }
        QueueCommands::Failed { json } => {
            let operations = queue.list_failed().await?;
            print_operations(&operations, json, "No failed operations.")
        }
        QueueCommands::Requeue { id } => {
            if queue.get(id).await?.is_none() {
                return Err(CliError::OperationNotFound(id));
            }
            if !queue.requeue_failed(id).await? {
                return Err(CliError::OperationNotFailed(id));
            }
            println!("{id}");
            Ok(())
        }
        QueueCommands::Remove { id } => {
            queue.remove(id).await?;
            println!("{id}");
            Ok(())
        }
        QueueCommands::Clear { yes } => {
            if !yes {
                return Err(CliError::ConfirmationRequired);
            }
            let removed = queue.clear().await?;
            println!("Removed {removed} operation(s)");
            Ok(())
        }
    }
}

async fn run_queue_add(
    queue: &OperationQueue,
    action: ActionArg,
    collection: &str,
    record_id: Option<&str>,
    data: Option<&str>,
) -> Result<(), CliError> {
    let payload = parse_payload(data)?;
    let id = queue
        .enqueue_action(action.into(), collection, record_id, payload.as_ref())
        .await?;
    println!("{id}");
    Ok(())
}

fn print_operations(
    operations: &[sovereign_core::models::QueuedOperation],
    as_json: bool,
    empty_message: &str,
) -> Result<(), CliError> {
    let now = now_millis();
    if as_json {
        let items = operations
            .iter()
            .map(|operation| operation_to_item(operation, now))
            .collect::<Vec<OperationItem>>();
        return print_json(&items);
    }

    if operations.is_empty() {
        println!("{empty_message}");
        return Ok(());
    }
    for line in format_operation_lines(operations, now) {
        println!("{line}");
    }
    Ok(())
}
