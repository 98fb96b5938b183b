//! Push messages and notification clicks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::host::Host;

/// Decoded push message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    /// Notification title.
    pub title: String,
    /// Notification text.
    #[serde(default)]
    pub body: String,
    /// Optional large image.
    pub image: Option<String>,
    /// Page opened when the notification is clicked.
    pub url: Option<String>,
    /// Sender-defined identifier.
    pub primary_key: Option<serde_json::Value>,
}

impl PushPayload {
    /// Parses a JSON push payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Push`] if the payload is not valid JSON of the
    /// expected shape.
    pub fn parse(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| Error::Push(format!("malformed payload: {e}")))
    }
}

/// How notifications are presented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Small icon.
    pub icon: String,
    /// Monochrome badge.
    pub badge: String,
    /// Vibration pattern in milliseconds.
    pub vibrate: Vec<u32>,
    /// Label of the `explore` action.
    pub explore_title: String,
    /// Icon of the `explore` action.
    pub explore_icon: String,
    /// Label of the `close` action.
    pub close_title: String,
    /// Icon of the `close` action.
    pub close_icon: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            icon: "/images/icons/icon-192x192.png".to_string(),
            badge: "/images/icons/icon-72x72.png".to_string(),
            vibrate: vec![100, 50, 100],
            explore_title: "Voir le portfolio".to_string(),
            explore_icon: "/images/icons/icon-96x96.png".to_string(),
            close_title: "Fermer".to_string(),
            close_icon: "/images/icons/close-icon.png".to_string(),
        }
    }
}

/// Data attached to a notification and handed back on click.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    /// When the push arrived.
    pub date_of_arrival: DateTime<Utc>,
    /// Sender identifier, `1` when absent.
    pub primary_key: serde_json::Value,
    /// Click target, `/` when absent.
    pub url: String,
}

/// A button shown on the notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionButton {
    /// Action identifier reported on click.
    pub action: String,
    /// Button label.
    pub title: String,
    /// Button icon.
    pub icon: String,
}

/// A notification ready to be displayed by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Title line.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Small icon.
    pub icon: String,
    /// Monochrome badge.
    pub badge: String,
    /// Optional large image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Vibration pattern in milliseconds.
    pub vibrate: Vec<u32>,
    /// Data handed back on click.
    pub data: NotificationData,
    /// Buttons shown on the notification.
    pub actions: Vec<ActionButton>,
    /// Stays visible until the user acts on it.
    pub require_interaction: bool,
    /// Shown without sound or vibration.
    pub silent: bool,
}

impl Notification {
    /// Builds the notification for a push payload.
    #[must_use]
    pub fn from_payload(payload: PushPayload, config: &NotificationConfig) -> Self {
        Self {
            title: payload.title,
            body: payload.body,
            icon: config.icon.clone(),
            badge: config.badge.clone(),
            image: payload.image,
            vibrate: config.vibrate.clone(),
            data: NotificationData {
                date_of_arrival: Utc::now(),
                primary_key: payload.primary_key.unwrap_or_else(|| 1.into()),
                url: payload.url.unwrap_or_else(|| "/".to_string()),
            },
            actions: vec![
                ActionButton {
                    action: "explore".to_string(),
                    title: config.explore_title.clone(),
                    icon: config.explore_icon.clone(),
                },
                ActionButton {
                    action: "close".to_string(),
                    title: config.close_title.clone(),
                    icon: config.close_icon.clone(),
                },
            ],
            require_interaction: true,
            silent: false,
        }
    }
}

/// Which part of a notification the user clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    /// The `explore` button.
    Explore,
    /// The `close` button.
    Close,
    /// The notification body, or an unknown action.
    Default,
}

impl NotificationAction {
    /// Maps the host's action string.
    #[must_use]
    pub fn parse(action: &str) -> Self {
        match action {
            "explore" => Self::Explore,
            "close" => Self::Close,
            _ => Self::Default,
        }
    }
}

/// What a notification click led to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ClickOutcome {
    /// The notification was only closed.
    Dismissed,
    /// An existing window showing the target was focused.
    Focused {
        /// Focused window id.
        window: String,
    },
    /// A new window was opened at the target.
    Opened {
        /// Opened URL.
        url: String,
    },
}

/// Displays the notification for a push message.
///
/// An empty push carries nothing to show and yields `Ok(None)`.
///
/// # Errors
///
/// Returns an error if the payload is malformed or the host refuses to
/// display the notification.
pub async fn show_push(
    host: &dyn Host,
    config: &NotificationConfig,
    data: Option<&[u8]>,
) -> Result<Option<Notification>> {
    let Some(data) = data.filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    let notification = Notification::from_payload(PushPayload::parse(data)?, config);
    host.show_notification(&notification).await?;
    Ok(Some(notification))
}

/// Routes a notification click to a window.
///
/// # Errors
///
/// Returns an error if the host cannot list, focus or open windows.
pub async fn handle_click(
    host: &dyn Host,
    action: NotificationAction,
    target: Option<&str>,
) -> Result<ClickOutcome> {
    if action == NotificationAction::Close {
        return Ok(ClickOutcome::Dismissed);
    }
    let target = target.filter(|t| !t.is_empty()).unwrap_or("/");

    let windows = host.windows().await?;
    if let Some(window) = windows.iter().find(|w| w.url.contains(target)) {
        host.focus(window).await?;
        return Ok(ClickOutcome::Focused {
            window: window.id.clone(),
        });
    }

    host.open_window(target).await?;
    Ok(ClickOutcome::Opened {
        url: target.to_string(),
    })
}
