// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sample mobile-app session replayed by `MOBILE_LOGGER_DEMO=true`.

use mobile_logger::observers::{ErrorOrigin, HostEvent};
use mobile_logger::record::{category, Location};
use mobile_logger::{LogEntry, LogLevel};

pub fn sample_entries() -> Vec<LogEntry> {
    vec![
        LogEntry::new("User Login", "User successfully logged in")
            .level(LogLevel::Info)
            .category(category::USER_ACTION)
            .screen("LoginScreen")
            .action("login")
            .meta("loginMethod", "email")
            .meta("loginTime", "2.3s"),
        LogEntry::new("Network Error", "Failed to fetch user data")
            .level(LogLevel::Error)
            .category(category::ERROR)
            .screen("ProfileScreen")
            .action("fetch_profile")
            .error_code("NETWORK_TIMEOUT")
            .error_stack("NetworkError: Request timeout at fetchUserData.js:45")
            .error_context("User was viewing profile when network failed")
            .network_status("wifi")
            .meta("retryCount", 3)
            .meta("endpoint", "/api/user/profile"),
        LogEntry::new("Image Load Performance", "Profile image loaded successfully")
            .level(LogLevel::Info)
            .category(category::PERFORMANCE)
            .screen("ProfileScreen")
            .action("load_image")
            .duration(1250)
            .memory_usage("45MB")
            .meta("imageSize", "2.3MB")
            .meta("cacheHit", false),
        LogEntry::new("App Backgrounded", "Application moved to background")
            .level(LogLevel::Info)
            .category(category::SYSTEM)
            .screen("HomeScreen")
            .action("app_background")
            .meta("batteryLevel", "78%"),
        LogEntry::new("Location Updated", "User location changed")
            .level(LogLevel::Info)
            .category(category::EVENT)
            .screen("MapScreen")
            .action("location_update")
            .location(Location {
                latitude: 37.7749,
                longitude: -122.4194,
                accuracy: 10.0,
            })
            .meta("locationSource", "GPS"),
        LogEntry::new("Low Memory Warning", "Device memory is running low")
            .level(LogLevel::Warning)
            .category(category::SYSTEM)
            .screen("GalleryScreen")
            .action("memory_warning")
            .memory_usage("85MB")
            .meta("availableMemory", "15MB")
            .meta("actionTaken", "cleared_image_cache"),
        LogEntry::new("API Request Debug", "Making API request to /api/posts")
            .level(LogLevel::Debug)
            .category(category::EVENT)
            .screen("FeedScreen")
            .action("api_request")
            .network_status("wifi")
            .meta("endpoint", "/api/posts")
            .meta("method", "GET"),
        LogEntry::new("Push Notification Received", "New message from John Doe")
            .level(LogLevel::Info)
            .category(category::NOTIFICATION)
            .screen("ChatScreen")
            .action("push_notification")
            .meta("notificationType", "message")
            .meta("senderId", "john_doe"),
    ]
}

pub fn sample_events() -> Vec<HostEvent> {
    vec![
        HostEvent::Navigation {
            from: "/home".to_string(),
            to: "/profile".to_string(),
        },
        HostEvent::Click {
            screen: "/profile".to_string(),
            tag_name: "BUTTON".to_string(),
            id: Some("save".to_string()),
            class_name: None,
            text: Some("Save".to_string()),
        },
        HostEvent::NetworkRequest {
            url: "https://api.example.com/users".to_string(),
            method: "GET".to_string(),
            status: 200,
            status_text: "OK".to_string(),
            duration_ms: 180,
            online: true,
        },
        HostEvent::Error {
            message: "Cannot read properties of undefined".to_string(),
            stack: None,
            origin: ErrorOrigin::Script {
                filename: "app.js".to_string(),
                line: 42,
                column: 7,
            },
        },
    ]
}
