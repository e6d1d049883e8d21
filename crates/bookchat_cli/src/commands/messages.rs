//! Message commands: post, list, show, pending.

use super::{format_message_line, open_store, print_json, OutputFormat};
use bookchat_core::{BoardConfig, ListLimit, ListQuery, Message, MessageId, MessageStore};

/// Posts a message.
pub fn post(
    config: BoardConfig,
    content: String,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let message = store.create(content)?;
    store.flush()?;

    match format {
        OutputFormat::Json => print_json(&message)?,
        OutputFormat::Text => println!("Posted message #{}", message.id),
    }
    Ok(())
}

/// Lists messages. With `since`, lists messages after that id oldest
/// first; otherwise newest first from `offset`.
pub fn list(
    config: BoardConfig,
    limit: Option<usize>,
    offset: usize,
    since: Option<u64>,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let messages = query(&store, limit, offset, since);
    print_messages(&messages, format, "No messages")
}

/// Shows one message.
pub fn show(
    config: BoardConfig,
    id: u64,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let message = store.get(MessageId::new(id))?;

    match format {
        OutputFormat::Json => print_json(&message)?,
        OutputFormat::Text => print_message_detail(&message),
    }
    Ok(())
}

/// Lists messages waiting to be mirrored.
pub fn pending(config: BoardConfig, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let messages = store.list_pending();
    print_messages(&messages, format, "Nothing pending")
}

fn query(store: &MessageStore, limit: Option<usize>, offset: usize, since: Option<u64>) -> Vec<Message> {
    let limit = limit.map_or(ListLimit::Default, ListLimit::Count);
    match since {
        Some(since) => store.list_since(MessageId::new(since), limit),
        None => store.list(ListQuery { limit, offset }),
    }
}

fn print_messages(
    messages: &[Message],
    format: OutputFormat,
    empty: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => print_json(messages)?,
        OutputFormat::Text if messages.is_empty() => println!("{empty}"),
        OutputFormat::Text => {
            for message in messages {
                println!("{}", format_message_line(message));
            }
        }
    }
    Ok(())
}

fn print_message_detail(message: &Message) {
    println!("Message #{}", message.id);
    println!("  Created: {}", message.created_at.to_rfc3339());
    match message.remote_ref() {
        Some(remote_ref) => println!("  Synced:  {remote_ref}"),
        None => println!("  Synced:  no"),
    }
    println!();
    println!("{}", message.content);
}
