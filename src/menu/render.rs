//! Turns a node plus session into selectable actions, and action tokens back into commands.
//!
//! Tokens are opaque to the bot front end. They are decoded once, here, into [`Command`];
//! nothing downstream looks at the raw string again.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::session::NavigationSession;
use crate::models::{is_url, Content, ContentType, MenuNode, LOCAL_CONTENT_PREFIX};

pub const BACK_LABEL: &str = "Back";
pub const HOME_LABEL: &str = "Home";
pub const ASK_QUESTION_LABEL: &str = "Ask a question";
pub const RATE_PROMPT_TEXT: &str = "Was this content useful?";
pub const USEFUL_LABEL: &str = "Useful";
pub const NOT_USEFUL_LABEL: &str = "Not useful";

/// A decoded user selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Command {
    Child { index: usize },
    Content { index: usize },
    Back,
    Home,
    AskQuestion,
    #[serde(rename_all = "camelCase")]
    Rate { node_id: Uuid, useful: bool },
}

impl Command {
    /// Encode as the opaque token carried by a button.
    pub fn token(&self) -> String {
        match self {
            Command::Child { index } => format!("menu:{}", index),
            Command::Content { index } => format!("cnt:{}", index),
            Command::Back => "back".to_string(),
            Command::Home => "home".to_string(),
            Command::AskQuestion => "ask_question".to_string(),
            Command::Rate { node_id, useful } => {
                format!("rate:{}:{}", node_id, if *useful { 1 } else { 0 })
            }
        }
    }
}

/// Outcome of decoding a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Command(Command),
    Unrecognized(String),
}

/// Decode an action token. Malformed input yields `Unrecognized`, never a panic.
pub fn interpret_selection(token: &str) -> Selection {
    match parse_token(token.trim()) {
        Some(command) => Selection::Command(command),
        None => Selection::Unrecognized(token.to_string()),
    }
}

fn parse_token(token: &str) -> Option<Command> {
    match token {
        "back" => return Some(Command::Back),
        "home" => return Some(Command::Home),
        "ask_question" => return Some(Command::AskQuestion),
        _ => {}
    }

    let (kind, rest) = token.split_once(':')?;
    match kind {
        "menu" => parse_index(rest).map(|index| Command::Child { index }),
        "cnt" => parse_index(rest).map(|index| Command::Content { index }),
        "rate" => {
            let (node_id, value) = rest.split_once(':')?;
            let node_id = Uuid::parse_str(node_id).ok()?;
            let useful = match value {
                "1" => true,
                "0" => false,
                _ => return None,
            };
            Some(Command::Rate { node_id, useful })
        }
        _ => None,
    }
}

fn parse_index(raw: &str) -> Option<usize> {
    // Digits only: rejects "+1", " 1" and friends that `parse` would accept or not
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// One selectable button.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MenuAction {
    pub label: String,
    pub token: String,
    pub command: Command,
}

impl MenuAction {
    pub fn new(label: impl Into<String>, command: Command) -> Self {
        Self {
            label: label.into(),
            token: command.token(),
            command,
        }
    }
}

/// Secondary, dismissible message asking for a vote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RatingPrompt {
    pub node_id: Uuid,
    pub text: String,
    pub actions: Vec<MenuAction>,
}

impl RatingPrompt {
    pub fn for_node(node_id: Uuid) -> Self {
        Self {
            node_id,
            text: RATE_PROMPT_TEXT.to_string(),
            actions: vec![
                MenuAction::new(USEFUL_LABEL, Command::Rate { node_id, useful: true }),
                MenuAction::new(
                    NOT_USEFUL_LABEL,
                    Command::Rate {
                        node_id,
                        useful: false,
                    },
                ),
            ],
        }
    }
}

/// Display payload for one menu screen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MenuView {
    pub node_id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub is_root: bool,
    pub actions: Vec<MenuAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating_prompt: Option<RatingPrompt>,
}

/// Build the screen for `node`.
///
/// The rating prompt is attached when the node has content, the user has not
/// rated it and the prompt has not been shown for this visit yet.
pub fn render(node: &MenuNode, session: &NavigationSession, is_root: bool) -> MenuView {
    let mut actions: Vec<MenuAction> = node
        .children_names
        .iter()
        .enumerate()
        .map(|(index, name)| MenuAction::new(name.clone(), Command::Child { index }))
        .collect();

    actions.extend(
        node.content
            .iter()
            .enumerate()
            .map(|(index, content)| {
                MenuAction::new(content.content_type.label(), Command::Content { index })
            }),
    );

    if !is_root {
        actions.push(MenuAction::new(BACK_LABEL, Command::Back));
        actions.push(MenuAction::new(HOME_LABEL, Command::Home));

        if !node.children_names.is_empty() && node.content.is_empty() {
            actions.push(MenuAction::new(ASK_QUESTION_LABEL, Command::AskQuestion));
        }
    }

    let rating_prompt = (!node.content.is_empty()
        && !session.rating_shown
        && !session.is_rated(node.id))
    .then(|| RatingPrompt::for_node(node.id));

    MenuView {
        node_id: node.id,
        title: node.name.clone(),
        body: node.text.clone(),
        is_root,
        actions,
        rating_prompt,
    }
}

/// How a piece of content reaches the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "delivery", rename_all = "camelCase")]
pub enum ContentDelivery {
    /// Remote media, sent as a link
    Link { url: String },
    /// Stored blob, sent as a file of the given kind
    #[serde(rename_all = "camelCase")]
    File {
        path: String,
        content_type: ContentType,
        caption: String,
    },
}

/// Decide how to deliver `content`; `None` when the path is neither a URL nor a stored blob.
pub fn deliver(content: &Content) -> Option<ContentDelivery> {
    let path = content.server_path.as_str();
    if is_url(path) {
        Some(ContentDelivery::Link {
            url: path.to_string(),
        })
    } else if path.starts_with(LOCAL_CONTENT_PREFIX) {
        Some(ContentDelivery::File {
            path: path.to_string(),
            content_type: content.content_type,
            caption: content.content_type.label().to_string(),
        })
    } else {
        None
    }
}
