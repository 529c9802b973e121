use std::collections::BTreeMap;

use dw_core::notify::PushMessage;
use serde::Serialize;

/// Android notification channel the mobile client registers for downtime alerts.
pub const ANDROID_CHANNEL_ID: &str = "server_status";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SendRequest<'a> {
    pub message: FcmMessage<'a>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FcmMessage<'a> {
    pub topic: &'a str,
    pub data: &'a BTreeMap<String, String>,
    pub android: AndroidConfig<'a>,
    pub apns: ApnsConfig,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AndroidConfig<'a> {
    pub priority: &'static str,
    pub notification: AndroidNotification<'a>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AndroidNotification<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub channel_id: &'static str,
    pub notification_priority: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ApnsConfig {
    pub headers: BTreeMap<&'static str, &'static str>,
    pub payload: ApnsPayload,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ApnsPayload {
    pub aps: Aps,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Aps {
    #[serde(rename = "content-available")]
    pub content_available: u8,
}

/// Map a provider-neutral message onto an FCM HTTP v1 send request.
///
/// iOS gets a high-priority background push carrying only the data payload; Android gets a
/// visible notification on the downtime channel.
pub fn build_send_request(message: &PushMessage) -> SendRequest<'_> {
    let mut headers = BTreeMap::new();
    headers.insert("apns-priority", "10");

    SendRequest {
        message: FcmMessage {
            topic: &message.topic,
            data: &message.data,
            android: AndroidConfig {
                priority: "HIGH",
                notification: AndroidNotification {
                    title: &message.title,
                    body: &message.body,
                    channel_id: ANDROID_CHANNEL_ID,
                    notification_priority: "PRIORITY_HIGH",
                },
            },
            apns: ApnsConfig {
                headers,
                payload: ApnsPayload {
                    aps: Aps {
                        content_available: 1,
                    },
                },
            },
        },
    }
}
