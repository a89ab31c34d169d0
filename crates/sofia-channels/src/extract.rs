//! Platform payload extraction.
//!
//! Pulls a (sender, text) pair out of the heterogeneous webhook payload
//! shapes. Absent keys at any level — missing `entry`, empty arrays,
//! status-only events — are an ordinary "no message" outcome, never an
//! error.

use serde_json::Value;
use sofia_core::message::{ExtractedMessage, Platform};
use tracing::debug;

/// Extract the first processable text message from a webhook payload,
/// or `None` when the event carries nothing to answer.
pub fn extract(payload: &Value, platform: Platform) -> Option<ExtractedMessage> {
    match platform {
        Platform::Whatsapp => extract_whatsapp(payload),
        Platform::Facebook | Platform::Instagram => extract_messenger(payload, platform),
    }
}

/// WhatsApp Cloud API shape: `entry[0].changes[0].value`.
///
/// A `statuses` key marks delivery/read receipts — dropped. Of the
/// message types, `text` carries a body, an `image` caption is kept with
/// a tag, `audio` becomes a fixed placeholder; everything else (stickers,
/// reactions, locations) is ignored.
fn extract_whatsapp(payload: &Value) -> Option<ExtractedMessage> {
    let value = payload
        .get("entry")?
        .get(0)?
        .get("changes")?
        .get(0)?
        .get("value")?;

    if value.get("statuses").is_some() {
        debug!("whatsapp: status event, nothing to answer");
        return None;
    }

    let message = value.get("messages")?.get(0)?;
    let sender_id = message.get("from")?.as_str()?.to_string();

    let text = match message.get("type")?.as_str()? {
        "text" => message.get("text")?.get("body")?.as_str()?.to_string(),
        "image" => {
            let caption = message.get("image")?.get("caption")?.as_str()?;
            format!("[IMAGE] {caption}")
        }
        "audio" => "[AUDIO]".to_string(),
        other => {
            debug!("whatsapp: ignoring message type {other}");
            return None;
        }
    };

    Some(ExtractedMessage {
        platform: Platform::Whatsapp,
        sender_id,
        text,
    })
}

/// Messenger shape, shared by Facebook and Instagram:
/// `entry[0].messaging[]`. The first event carrying `message.text`, a
/// quick-reply payload, or a postback payload wins.
fn extract_messenger(payload: &Value, platform: Platform) -> Option<ExtractedMessage> {
    let events = payload
        .get("entry")?
        .get(0)?
        .get("messaging")?
        .as_array()?;

    for event in events {
        let Some(sender_id) = event
            .get("sender")
            .and_then(|s| s.get("id"))
            .and_then(Value::as_str)
        else {
            continue;
        };

        let text = event
            .get("message")
            .and_then(|m| m.get("text"))
            .and_then(Value::as_str)
            .or_else(|| {
                event
                    .get("message")
                    .and_then(|m| m.get("quick_reply"))
                    .and_then(|q| q.get("payload"))
                    .and_then(Value::as_str)
            })
            .or_else(|| {
                event
                    .get("postback")
                    .and_then(|p| p.get("payload"))
                    .and_then(Value::as_str)
            });

        if let Some(text) = text {
            return Some(ExtractedMessage {
                platform,
                sender_id: sender_id.to_string(),
                text: text.to_string(),
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_whatsapp_text_message() {
        let payload = json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "messages": [{
                            "from": "5584999990000",
                            "type": "text",
                            "text": {"body": "Qual o horário de funcionamento?"}
                        }]
                    }
                }]
            }]
        });
        let msg = extract(&payload, Platform::Whatsapp).unwrap();
        assert_eq!(msg.sender_id, "5584999990000");
        assert_eq!(msg.text, "Qual o horário de funcionamento?");
        assert_eq!(msg.platform, Platform::Whatsapp);
    }

    #[test]
    fn test_whatsapp_status_event_yields_nothing() {
        let payload = json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "statuses": [{"id": "wamid.x", "status": "delivered"}]
                    }
                }]
            }]
        });
        assert!(extract(&payload, Platform::Whatsapp).is_none());
    }

    #[test]
    fn test_whatsapp_image_with_caption_tagged() {
        let payload = json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "messages": [{
                            "from": "5584999990000",
                            "type": "image",
                            "image": {"id": "media-1", "caption": "tem esse modelo?"}
                        }]
                    }
                }]
            }]
        });
        let msg = extract(&payload, Platform::Whatsapp).unwrap();
        assert_eq!(msg.text, "[IMAGE] tem esse modelo?");
    }

    #[test]
    fn test_whatsapp_image_without_caption_ignored() {
        let payload = json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "messages": [{
                            "from": "5584999990000",
                            "type": "image",
                            "image": {"id": "media-1"}
                        }]
                    }
                }]
            }]
        });
        assert!(extract(&payload, Platform::Whatsapp).is_none());
    }

    #[test]
    fn test_whatsapp_audio_placeholder() {
        let payload = json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "messages": [{
                            "from": "5584999990000",
                            "type": "audio",
                            "audio": {"id": "media-2"}
                        }]
                    }
                }]
            }]
        });
        let msg = extract(&payload, Platform::Whatsapp).unwrap();
        assert_eq!(msg.text, "[AUDIO]");
    }

    #[test]
    fn test_whatsapp_sticker_ignored() {
        let payload = json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "messages": [{
                            "from": "5584999990000",
                            "type": "sticker",
                            "sticker": {"id": "media-3"}
                        }]
                    }
                }]
            }]
        });
        assert!(extract(&payload, Platform::Whatsapp).is_none());
    }

    #[test]
    fn test_messenger_text_message() {
        let payload = json!({
            "entry": [{
                "messaging": [{
                    "sender": {"id": "24031"},
                    "message": {"text": "horário"}
                }]
            }]
        });
        let msg = extract(&payload, Platform::Facebook).unwrap();
        assert_eq!(msg.sender_id, "24031");
        assert_eq!(msg.text, "horário");
        assert_eq!(msg.platform, Platform::Facebook);
    }

    #[test]
    fn test_messenger_quick_reply_payload() {
        let payload = json!({
            "entry": [{
                "messaging": [{
                    "sender": {"id": "24031"},
                    "message": {"quick_reply": {"payload": "VER_PRECOS"}}
                }]
            }]
        });
        let msg = extract(&payload, Platform::Instagram).unwrap();
        assert_eq!(msg.text, "VER_PRECOS");
        assert_eq!(msg.platform, Platform::Instagram);
    }

    #[test]
    fn test_messenger_postback_payload() {
        let payload = json!({
            "entry": [{
                "messaging": [{
                    "sender": {"id": "24031"},
                    "postback": {"payload": "COMECAR"}
                }]
            }]
        });
        let msg = extract(&payload, Platform::Facebook).unwrap();
        assert_eq!(msg.text, "COMECAR");
    }

    #[test]
    fn test_messenger_skips_read_receipts_finds_text() {
        let payload = json!({
            "entry": [{
                "messaging": [
                    {"sender": {"id": "24031"}, "read": {"watermark": 123}},
                    {"sender": {"id": "24031"}, "message": {"text": "oi"}}
                ]
            }]
        });
        let msg = extract(&payload, Platform::Facebook).unwrap();
        assert_eq!(msg.text, "oi");
    }

    #[test]
    fn test_missing_arrays_never_panic() {
        for payload in [
            json!({}),
            json!({"entry": []}),
            json!({"entry": [{}]}),
            json!({"entry": [{"changes": []}]}),
            json!({"entry": [{"changes": [{}]}]}),
            json!({"entry": [{"changes": [{"value": {}}]}]}),
            json!({"entry": [{"changes": [{"value": {"messages": []}}]}]}),
            json!({"entry": [{"messaging": []}]}),
            json!({"entry": [{"messaging": [{}]}]}),
            json!({"object": "page"}),
        ] {
            assert!(extract(&payload, Platform::Whatsapp).is_none());
            assert!(extract(&payload, Platform::Facebook).is_none());
            assert!(extract(&payload, Platform::Instagram).is_none());
        }
    }

    #[test]
    fn test_message_missing_from_field_is_no_message() {
        let payload = json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "messages": [{"type": "text", "text": {"body": "oi"}}]
                    }
                }]
            }]
        });
        assert!(extract(&payload, Platform::Whatsapp).is_none());
    }
}
