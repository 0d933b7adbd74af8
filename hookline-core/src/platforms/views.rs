// File: hookline-core/src/platforms/views.rs
//
// Dashboard-facing summaries built from live connection data.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use hookline_common::models::chat::{non_empty, user_part};
use hookline_common::models::{ChatInfo, ContactInfo, GroupParticipant};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: String,
    pub name: String,
    pub is_group: bool,
    pub unread_count: i64,
    pub is_muted: bool,
    pub is_archived: bool,
    pub is_typing: bool,
    pub last_message_preview: Option<String>,
    pub last_message_timestamp: Option<DateTime<Utc>>,
    pub last_message_from_me: Option<bool>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub id: String,
    pub name: String,
    pub participants: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    pub id: String,
    pub number: String,
    pub name: String,
    pub is_admin: bool,
    pub is_super_admin: bool,
}

/// name, formatted title, group id, contact push name, user part, raw id.
pub fn normalize_chat_name(chat: &ChatInfo) -> String {
    if let Some(n) = non_empty(&chat.name) {
        return n;
    }
    if let Some(t) = non_empty(&chat.formatted_title) {
        return t;
    }
    let user = user_part(&chat.id);
    if chat.is_group && !user.is_empty() {
        return user.to_string();
    }
    if let Some(p) = non_empty(&chat.contact_pushname) {
        return p;
    }
    if !user.is_empty() {
        return user.to_string();
    }
    if !chat.id.is_empty() {
        return chat.id.clone();
    }
    "Unknown chat".to_string()
}

fn unix_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

pub fn chat_summary(chat: &ChatInfo, is_typing: bool) -> ChatSummary {
    let (preview, ts, from_me) = match &chat.last_message {
        Some(m) => (
            Some(m.body.clone()),
            m.timestamp.and_then(unix_to_utc),
            Some(m.from_me),
        ),
        None => (None, None, None),
    };
    ChatSummary {
        id: chat.id.clone(),
        name: normalize_chat_name(chat),
        is_group: chat.is_group,
        unread_count: chat.unread_count.max(0),
        is_muted: chat.is_muted,
        is_archived: chat.is_archived,
        is_typing,
        last_message_preview: preview,
        last_message_timestamp: ts,
        last_message_from_me: from_me,
    }
}

/// Newest conversation first; chats without a last message sink to the bottom.
pub fn sort_chats(chats: &mut [ChatSummary]) {
    chats.sort_by(|a, b| {
        let at = a.last_message_timestamp.map(|t| t.timestamp_millis()).unwrap_or(0);
        let bt = b.last_message_timestamp.map(|t| t.timestamp_millis()).unwrap_or(0);
        bt.cmp(&at)
    });
}

pub fn group_summary(chat: &ChatInfo) -> GroupSummary {
    GroupSummary {
        id: chat.id.clone(),
        name: normalize_chat_name(chat),
        participants: chat.participants.len(),
    }
}

pub fn sort_groups(groups: &mut [GroupSummary]) {
    groups.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
}

/// `contact` is `None` when the lookup failed; the raw user part is used then.
pub fn participant_summary(p: &GroupParticipant, contact: Option<&ContactInfo>) -> ParticipantSummary {
    let user = user_part(&p.id).to_string();
    let (number, name) = match contact {
        Some(c) => (
            non_empty(&c.number).unwrap_or_else(|| user.clone()),
            non_empty(&c.name)
                .or_else(|| non_empty(&c.pushname))
                .or_else(|| non_empty(&c.short_name))
                .unwrap_or_else(|| user.clone()),
        ),
        None => (user.clone(), user.clone()),
    };
    ParticipantSummary {
        id: p.id.clone(),
        number,
        name,
        is_admin: p.is_admin,
        is_super_admin: p.is_super_admin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookline_common::models::LastMessage;

    fn chat(id: &str) -> ChatInfo {
        ChatInfo {
            id: id.into(),
            ..Default::default()
        }
    }

    #[test]
    fn chat_name_fallback_order() {
        let mut c = chat("555@c.us");
        assert_eq!(normalize_chat_name(&c), "555");

        c.contact_pushname = Some("Pushy".into());
        assert_eq!(normalize_chat_name(&c), "Pushy");

        c.formatted_title = Some("+1 555".into());
        assert_eq!(normalize_chat_name(&c), "+1 555");

        c.name = Some("Alice".into());
        assert_eq!(normalize_chat_name(&c), "Alice");

        let mut g = chat("12036@g.us");
        g.is_group = true;
        g.contact_pushname = Some("ignored".into());
        assert_eq!(normalize_chat_name(&g), "12036");

        assert_eq!(normalize_chat_name(&chat("")), "Unknown chat");
    }

    #[test]
    fn chats_sort_newest_first() {
        let mut a = chat("a@c.us");
        a.last_message = Some(LastMessage { body: "old".into(), timestamp: Some(100), from_me: false });
        let mut b = chat("b@c.us");
        b.last_message = Some(LastMessage { body: "new".into(), timestamp: Some(200), from_me: true });
        let c = chat("c@c.us");

        let mut list = vec![chat_summary(&c, false), chat_summary(&a, false), chat_summary(&b, true)];
        sort_chats(&mut list);
        let ids: Vec<_> = list.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b@c.us", "a@c.us", "c@c.us"]);
        assert_eq!(list[0].last_message_from_me, Some(true));
        assert!(list[0].is_typing);
        assert_eq!(list[2].last_message_preview, None);
    }

    #[test]
    fn participant_falls_back_to_user_part() {
        let p = GroupParticipant { id: "777@c.us".into(), is_admin: true, is_super_admin: false };
        let s = participant_summary(&p, None);
        assert_eq!(s.number, "777");
        assert_eq!(s.name, "777");
        assert!(s.is_admin);

        let contact = ContactInfo {
            id: "777@c.us".into(),
            short_name: Some("Sev".into()),
            number: Some("15557777".into()),
            ..Default::default()
        };
        let s = participant_summary(&p, Some(&contact));
        assert_eq!(s.number, "15557777");
        assert_eq!(s.name, "Sev");
    }
}
