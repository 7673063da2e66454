/// Action validation and dispatch.
///
/// Actions are looked up by name in the running conversation, cloned, and
/// completed with any message or target supplied by the option or tag that
/// fired them. The loaded conversation is never mutated.

use thiserror::Error;
use tracing::{error, info, warn};

use crate::schema::action::{Action, ActionType};
use crate::schema::conversation::Conversation;

/// Log target for script-authored log lines.
pub const SCRIPT_LOG_TARGET: &str = "dialogue::script";

#[derive(Debug, Error, PartialEq)]
pub enum ActionError {
    #[error("action '{0}' is not declared by the conversation")]
    NotFound(String),
    #[error("action needs a name")]
    EmptyName,
    #[error("action '{name}' has unknown type '{type_name}'")]
    UnknownType { name: String, type_name: String },
    #[error("action '{name}' ({action_type}) needs a message")]
    MissingMessage {
        name: String,
        action_type: ActionType,
    },
    #[error("action '{name}' ({action_type}) needs a target")]
    MissingTarget {
        name: String,
        action_type: ActionType,
    },
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

#[derive(Debug, Error, PartialEq)]
#[error("no message target named '{0}'")]
pub struct DeliveryError(pub String);

/// Routes `SendMessage` payloads to named game objects.
pub trait MessageSink {
    fn deliver_message(&mut self, target: &str, message: &str) -> Result<(), DeliveryError>;
}

/// Sink with no targets; every delivery fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMessageTargets;

impl MessageSink for NoMessageTargets {
    fn deliver_message(&mut self, target: &str, _message: &str) -> Result<(), DeliveryError> {
        Err(DeliveryError(target.to_string()))
    }
}

/// Engine-level effects requested by actions and tags.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    CloseConversation,
    ChangeTheme(String),
    StartBackgroundConversation(String),
    CloseBackgroundConversations,
}

/// Field supplied at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOverride<'a> {
    None,
    Message(&'a str),
    Target(&'a str),
}

/// Load-time check: a name and a known type. Missing message or target
/// only warns, since options and tags can supply them.
pub fn validate_declared(action: &Action) -> Result<ActionType, ActionError> {
    if action.name.trim().is_empty() {
        return Err(ActionError::EmptyName);
    }
    let action_type = action.action_type().ok_or_else(|| ActionError::UnknownType {
        name: action.name.clone(),
        type_name: action.type_name.clone(),
    })?;
    if let Err(err) = validate(action) {
        warn!("{}; it must be supplied when the action fires", err);
    }
    Ok(action_type)
}

/// Dispatch-time check: every field the type needs is present.
pub fn validate(action: &Action) -> Result<ActionType, ActionError> {
    let action_type = action.action_type().ok_or_else(|| ActionError::UnknownType {
        name: action.name.clone(),
        type_name: action.type_name.clone(),
    })?;
    if action_type.requires_message() && action.message().is_none() {
        return Err(ActionError::MissingMessage {
            name: action.name.clone(),
            action_type,
        });
    }
    if action_type.requires_target() && action.target().is_none() {
        return Err(ActionError::MissingTarget {
            name: action.name.clone(),
            action_type,
        });
    }
    Ok(action_type)
}

pub fn log_script(level: ActionType, message: &str) {
    match level {
        ActionType::LogWarning => warn!(target: SCRIPT_LOG_TARGET, "{}", message),
        ActionType::LogError => error!(target: SCRIPT_LOG_TARGET, "{}", message),
        _ => info!(target: SCRIPT_LOG_TARGET, "{}", message),
    }
}

/// Validate and run a fully specified action.
///
/// Effects that belong to an engine come back as a [`ControlRequest`].
pub fn perform(
    action: &Action,
    messages: &mut dyn MessageSink,
) -> Result<Option<ControlRequest>, ActionError> {
    let action_type = validate(action).map_err(|e| {
        error!("skipping action: {}", e);
        e
    })?;
    let message = action.message().unwrap_or_default();

    let request = match action_type {
        ActionType::Log | ActionType::LogWarning | ActionType::LogError => {
            log_script(action_type, message);
            None
        }
        ActionType::SendMessage => {
            let target = action.target().unwrap_or_default();
            messages.deliver_message(target, message).map_err(|e| {
                error!(action = %action.name, "{}", e);
                ActionError::from(e)
            })?;
            None
        }
        ActionType::CloseConversation => Some(ControlRequest::CloseConversation),
        ActionType::ChangeTheme => Some(ControlRequest::ChangeTheme(message.to_string())),
        ActionType::StartBackgroundConversation => {
            Some(ControlRequest::StartBackgroundConversation(message.to_string()))
        }
        ActionType::CloseBackgroundConversations => Some(ControlRequest::CloseBackgroundConversations),
    };
    Ok(request)
}

/// Look up `name` in `conversation`, apply `extra`, and perform it.
pub fn perform_named(
    conversation: &Conversation,
    name: &str,
    extra: ActionOverride<'_>,
    messages: &mut dyn MessageSink,
) -> Result<Option<ControlRequest>, ActionError> {
    let Some(declared) = conversation.action(name) else {
        let err = ActionError::NotFound(name.to_string());
        error!("{}", err);
        return Err(err);
    };
    let mut action = declared.clone();
    match extra {
        ActionOverride::None => {}
        ActionOverride::Message(m) => action.message = Some(m.to_string()),
        ActionOverride::Target(t) => action.target = Some(t.to_string()),
    }
    perform(&action, messages)
}
