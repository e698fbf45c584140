//! Shared messaging fixture for integration tests.
#![allow(dead_code)]

use modelgraph_core::{Data, FieldDefinition, FieldInput, LocalId, ModelDecl, ModelManager, RecordView};
use serde_json::json;

pub fn int(view: &RecordView<'_>, field: &str) -> i64 {
    view.attr(field).as_i64().unwrap_or(0)
}

/// Partner, Thread, ThreadCache, Message, Attachment and TrackingValue.
pub fn declare_messaging(manager: &mut ModelManager) {
    manager
        .declare(
            ModelDecl::new("Partner")
                .with_field(FieldDefinition::attr("id"))
                .with_field(FieldDefinition::attr("name"))
                .with_field(FieldDefinition::one2many("messagesAsAuthor", "Message").inverse("author"))
                .with_field(FieldDefinition::many2many("threads", "Thread").inverse("members"))
                .with_field(
                    FieldDefinition::many2many("receivedMessages", "Message").inverse("recipients"),
                )
                .with_natural_key(["id"]),
        )
        .unwrap();

    manager
        .declare(
            ModelDecl::new("Thread")
                .with_field(FieldDefinition::attr("id"))
                .with_field(FieldDefinition::attr("name"))
                .with_field(FieldDefinition::attr("isPinned").default(false))
                .with_field(
                    FieldDefinition::one2many("messages", "Message")
                        .inverse("originThread")
                        .causal(),
                )
                .with_field(FieldDefinition::many2many("members", "Partner").inverse("threads"))
                .with_field(
                    FieldDefinition::one2one("cache", "ThreadCache")
                        .inverse("thread")
                        .causal()
                        .autocreate(),
                )
                .with_field(FieldDefinition::attr("memberNames").related("members.name"))
                .with_field(FieldDefinition::attr("messageCount").compute("computeMessageCount", ["messages"]))
                .with_field(FieldDefinition::attr("bodyLength").compute("computeBodyLength", ["messages.body"]))
                .with_method("computeMessageCount", |thread| {
                    FieldInput::value(json!(thread.many("messages").len()))
                })
                .with_method("computeBodyLength", |thread| {
                    let total: usize = thread
                        .many("messages")
                        .iter()
                        .map(|m| m.attr("body").as_str().map_or(0, str::len))
                        .sum();
                    FieldInput::value(json!(total))
                })
                .with_method("displayName", |thread| {
                    let name = thread.attr("name").as_str().unwrap_or("").to_string();
                    FieldInput::value(json!(format!("#{}", name)))
                })
                .with_natural_key(["id"]),
        )
        .unwrap();

    manager
        .declare(
            ModelDecl::new("ThreadCache")
                .with_field(FieldDefinition::attr("isLoaded").default(false))
                .with_field(FieldDefinition::one2one("thread", "Thread").inverse("cache")),
        )
        .unwrap();

    manager
        .declare(
            ModelDecl::new("Message")
                .with_field(FieldDefinition::attr("id"))
                .with_field(FieldDefinition::attr("body"))
                .with_field(FieldDefinition::many2one("author", "Partner").inverse("messagesAsAuthor"))
                .with_field(FieldDefinition::many2one("originThread", "Thread").inverse("messages"))
                .with_field(
                    FieldDefinition::many2many("attachments", "Attachment")
                        .inverse("messages")
                        .causal(),
                )
                .with_field(
                    FieldDefinition::one2many("trackingValues", "TrackingValue")
                        .inverse("message")
                        .causal(),
                )
                .with_field(FieldDefinition::attr("threadName").related("originThread.name"))
                .with_field(FieldDefinition::attr("authorName").related("author.name"))
                .with_field(
                    FieldDefinition::many2many("recipients", "Partner")
                        .inverse("receivedMessages")
                        .related("originThread.members"),
                )
                .with_natural_key(["id"]),
        )
        .unwrap();

    manager
        .declare(
            ModelDecl::new("Attachment")
                .with_field(FieldDefinition::attr("id"))
                .with_field(FieldDefinition::attr("name"))
                .with_field(FieldDefinition::many2many("messages", "Message").inverse("attachments"))
                .with_natural_key(["id"]),
        )
        .unwrap();

    manager
        .declare(
            ModelDecl::new("TrackingValue")
                .with_field(FieldDefinition::attr("newValue"))
                .with_field(FieldDefinition::many2one("message", "Message").inverse("trackingValues")),
        )
        .unwrap();
}

/// A started manager with the messaging models.
pub fn messaging() -> ModelManager {
    let mut manager = ModelManager::default();
    declare_messaging(&mut manager);
    manager.start().unwrap();
    manager
}

pub fn thread(manager: &mut ModelManager, id: i64, name: &str) -> LocalId {
    manager
        .create("Thread", Data::new().set("id", id).set("name", name))
        .unwrap()
}

pub fn message(manager: &mut ModelManager, id: i64, thread: &LocalId) -> LocalId {
    manager
        .create(
            "Message",
            Data::new().set("id", id).link("originThread", thread),
        )
        .unwrap()
}
