// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host event hooks.
//!
//! The host application owns a [`HostHooks`] registry and reports what it
//! observes (errors, page loads, network calls, clicks, ...) by emitting
//! [`HostEvent`]s into it. Interested parties register an [`Observer`] per
//! [`ObserverKind`]; the shipper does so on start for each enabled capture
//! option and unregisters on stop.
//!
//! ```text
//!   host ──emit(HostEvent)──> HostHooks ──on_event──> Observer (per kind)
//!                                                        │
//!                                                        v
//!                                               LogShipper::record
//! ```
//!
//! [`entry_for_event`] holds the mapping from each event to the record it
//! produces.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::json;
use tracing::warn;

use crate::record::{category, Location, LogEntry, LogLevel};

/// What an observer is registered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObserverKind {
    Error,
    UnhandledRejection,
    PageLoad,
    NetworkRequest,
    NetworkError,
    Click,
    FormSubmit,
    Navigation,
    Notification,
    Location,
    LocationError,
}

/// Where an uncaught error was reported from.
#[derive(Clone, Debug, PartialEq)]
pub enum ErrorOrigin {
    /// A script error with a source position.
    Script {
        filename: String,
        line: u32,
        column: u32,
    },
    /// The runtime's global error handler.
    Global { is_fatal: bool },
}

/// Something the host observed.
#[derive(Clone, Debug, PartialEq)]
pub enum HostEvent {
    Error {
        message: String,
        stack: Option<String>,
        origin: ErrorOrigin,
    },
    UnhandledRejection {
        reason: Option<String>,
        stack: Option<String>,
    },
    PageLoad {
        load_time_ms: u64,
        dom_content_loaded_ms: u64,
        transfer_size: Option<u64>,
    },
    NetworkRequest {
        url: String,
        method: String,
        status: u16,
        status_text: String,
        duration_ms: u64,
        online: bool,
    },
    NetworkError {
        url: String,
        method: String,
        error: String,
        stack: Option<String>,
        duration_ms: u64,
        online: bool,
    },
    Click {
        screen: String,
        tag_name: String,
        id: Option<String>,
        class_name: Option<String>,
        text: Option<String>,
    },
    FormSubmit {
        screen: String,
        form_id: Option<String>,
        action: Option<String>,
        method: Option<String>,
    },
    Navigation {
        from: String,
        to: String,
    },
    Notification {
        title: String,
        body: Option<String>,
        tag: Option<String>,
    },
    Location {
        location: Location,
        altitude: Option<f64>,
        speed: Option<f64>,
    },
    LocationError {
        code: i32,
        message: String,
    },
}

impl HostEvent {
    #[must_use]
    pub fn kind(&self) -> ObserverKind {
        match self {
            HostEvent::Error { .. } => ObserverKind::Error,
            HostEvent::UnhandledRejection { .. } => ObserverKind::UnhandledRejection,
            HostEvent::PageLoad { .. } => ObserverKind::PageLoad,
            HostEvent::NetworkRequest { .. } => ObserverKind::NetworkRequest,
            HostEvent::NetworkError { .. } => ObserverKind::NetworkError,
            HostEvent::Click { .. } => ObserverKind::Click,
            HostEvent::FormSubmit { .. } => ObserverKind::FormSubmit,
            HostEvent::Navigation { .. } => ObserverKind::Navigation,
            HostEvent::Notification { .. } => ObserverKind::Notification,
            HostEvent::Location { .. } => ObserverKind::Location,
            HostEvent::LocationError { .. } => ObserverKind::LocationError,
        }
    }
}

/// Receives host events of the kinds it was registered for.
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &HostEvent);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct Registration {
    id: ObserverId,
    kind: ObserverKind,
    observer: Arc<dyn Observer>,
}

/// Registry the host emits events into.
#[derive(Default)]
pub struct HostHooks {
    next_id: AtomicU64,
    registrations: RwLock<Vec<Registration>>,
}

impl HostHooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, kind: ObserverKind, observer: Arc<dyn Observer>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        match self.registrations.write() {
            Ok(mut registrations) => registrations.push(Registration { id, kind, observer }),
            Err(_) => warn!("SHIPPER | Host hook registry poisoned, observer not registered"),
        }
        id
    }

    /// Removes a registration. Returns `false` if it was already gone.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let Ok(mut registrations) = self.registrations.write() else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        registrations.len() != before
    }

    /// Delivers `event` to every observer registered for its kind and returns
    /// how many received it.
    pub fn emit(&self, event: &HostEvent) -> usize {
        let kind = event.kind();
        // Observers run outside the lock so they may register or unregister.
        let targets: Vec<Arc<dyn Observer>> = match self.registrations.read() {
            Ok(registrations) => registrations
                .iter()
                .filter(|r| r.kind == kind)
                .map(|r| Arc::clone(&r.observer))
                .collect(),
            Err(_) => return 0,
        };
        for observer in &targets {
            observer.on_event(event);
        }
        targets.len()
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.registrations.read().map(|r| r.len()).unwrap_or(0)
    }
}

/// Builds the record describing a host event.
#[must_use]
pub fn entry_for_event(event: &HostEvent) -> LogEntry {
    match event {
        HostEvent::Error {
            message,
            stack,
            origin: ErrorOrigin::Script {
                filename,
                line,
                column,
            },
        } => LogEntry::new("JavaScript Error", message.as_str())
            .level(LogLevel::Error)
            .category(category::ERROR)
            .action("js_error")
            .error_code("JS_ERROR")
            .error_stack(stack.clone().unwrap_or_default())
            .error_context(format!("{filename}:{line}:{column}"))
            .meta("filename", filename.as_str())
            .meta("lineno", *line)
            .meta("colno", *column),
        HostEvent::Error {
            message,
            stack,
            origin: ErrorOrigin::Global { is_fatal },
        } => LogEntry::new("Unhandled Error", non_empty_or(message, "Unknown error"))
            .level(LogLevel::Error)
            .category(category::ERROR)
            .action("unhandled_error")
            .error_code("UNHANDLED_ERROR")
            .error_stack(stack.clone().unwrap_or_default())
            .meta("isFatal", *is_fatal),
        HostEvent::UnhandledRejection { reason, stack } => {
            let reason = reason.as_deref().unwrap_or("Unknown error");
            LogEntry::new("Unhandled Promise Rejection", reason)
                .level(LogLevel::Error)
                .category(category::ERROR)
                .action("promise_rejection")
                .error_code("PROMISE_REJECTION")
                .error_stack(stack.clone().unwrap_or_default())
                .meta("reason", reason)
        }
        HostEvent::PageLoad {
            load_time_ms,
            dom_content_loaded_ms,
            transfer_size,
        } => LogEntry::new(
            "Page Load Performance",
            format!("Page loaded in {load_time_ms}ms"),
        )
        .level(LogLevel::Info)
        .category(category::PERFORMANCE)
        .action("page_load")
        .duration(*load_time_ms)
        .meta("domContentLoaded", *dom_content_loaded_ms)
        .meta("transferSize", json!(transfer_size)),
        HostEvent::NetworkRequest {
            url,
            method,
            status,
            status_text,
            duration_ms,
            online,
        } => LogEntry::new(
            "Network Request",
            format!("Request to {url} completed in {duration_ms}ms"),
        )
        .level(LogLevel::Info)
        .category(category::PERFORMANCE)
        .action("network_request")
        .duration(*duration_ms)
        .network_status(online_status(*online))
        .meta("url", url.as_str())
        .meta("method", method.as_str())
        .meta("status", *status)
        .meta("statusText", status_text.as_str()),
        HostEvent::NetworkError {
            url,
            method,
            error,
            stack,
            duration_ms,
            online,
        } => LogEntry::new("Network Error", format!("Request to {url} failed: {error}"))
            .level(LogLevel::Error)
            .category(category::ERROR)
            .action("network_error")
            .duration(*duration_ms)
            .error_code("NETWORK_ERROR")
            .error_stack(stack.clone().unwrap_or_default())
            .network_status(online_status(*online))
            .meta("url", url.as_str())
            .meta("method", method.as_str())
            .meta("error", error.as_str()),
        HostEvent::Click {
            screen,
            tag_name,
            id,
            class_name,
            text,
        } => {
            let text: String = text.as_deref().unwrap_or_default().chars().take(100).collect();
            LogEntry::new("User Click", format!("Clicked on {}", tag_name.to_lowercase()))
                .level(LogLevel::Info)
                .category(category::USER_ACTION)
                .action("click")
                .screen(screen.as_str())
                .meta("tagName", tag_name.as_str())
                .meta("id", json!(id))
                .meta("className", json!(class_name))
                .meta("text", text)
        }
        HostEvent::FormSubmit {
            screen,
            form_id,
            action,
            method,
        } => LogEntry::new(
            "Form Submission",
            format!("Form submitted: {}", form_id.as_deref().unwrap_or("form")),
        )
        .level(LogLevel::Info)
        .category(category::USER_ACTION)
        .action("form_submit")
        .screen(screen.as_str())
        .meta("formId", json!(form_id))
        .meta("formAction", json!(action))
        .meta("formMethod", json!(method)),
        HostEvent::Navigation { from, to } => {
            LogEntry::new("Navigation", format!("Navigated to {to}"))
                .level(LogLevel::Info)
                .category(category::USER_ACTION)
                .action("navigation")
                .screen(to.as_str())
                .meta("from", from.as_str())
                .meta("to", to.as_str())
        }
        HostEvent::Notification { title, body, tag } => {
            LogEntry::new("Browser Notification", title.as_str())
                .level(LogLevel::Info)
                .category(category::NOTIFICATION)
                .action("notification_sent")
                .meta("body", body.as_deref().unwrap_or_default())
                .meta("tag", tag.as_deref().unwrap_or_default())
        }
        HostEvent::Location {
            location,
            altitude,
            speed,
        } => LogEntry::new("Location Updated", "User location obtained")
            .level(LogLevel::Info)
            .category(category::EVENT)
            .action("location_update")
            .location(*location)
            .meta("altitude", json!(altitude))
            .meta("speed", json!(speed)),
        HostEvent::LocationError { code, message } => {
            LogEntry::new("Location Error", format!("Location error: {message}"))
                .level(LogLevel::Warning)
                .category(category::ERROR)
                .action("location_error")
                .error_code("LOCATION_ERROR")
                .meta("errorCode", *code)
                .meta("errorMessage", message.as_str())
        }
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

fn online_status(online: bool) -> &'static str {
    if online {
        "online"
    } else {
        "offline"
    }
}
