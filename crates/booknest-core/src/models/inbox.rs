use serde::{Deserialize, Serialize};

use super::{check_len, check_required, NovelBrief, UserBrief};
use crate::time::{iso_millis, new_id, now, Timestamp};
use crate::Result;

pub const NOTIFICATIONS_PAGE: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub content: String,
    pub sender: String,
    #[serde(default)]
    pub reciever: Vec<String>,
    #[serde(rename = "createdAt", with = "iso_millis")]
    pub created_at: Timestamp,
    #[serde(rename = "updatedAt", with = "iso_millis")]
    pub updated_at: Timestamp,
}

impl Message {
    pub fn new(sender: &str, title: &str, content: &str, reciever: Vec<String>) -> Result<Self> {
        let title = title.trim();
        check_required("title", title)?;
        check_len("title", title, 255)?;
        check_required("content", content)?;
        let ts = now();
        Ok(Self {
            id: new_id(),
            title: title.to_string(),
            content: content.to_string(),
            sender: sender.to_string(),
            reciever,
            created_at: ts,
            updated_at: ts,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageView {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub content: String,
    pub sender: Option<UserBrief>,
    pub reciever: Vec<UserBrief>,
    #[serde(rename = "createdAt", with = "iso_millis")]
    pub created_at: Timestamp,
    #[serde(rename = "updatedAt", with = "iso_millis")]
    pub updated_at: Timestamp,
}

impl MessageView {
    pub fn assemble(message: &Message, sender: Option<UserBrief>, reciever: Vec<UserBrief>) -> Self {
        Self {
            id: message.id.clone(),
            title: message.title.clone(),
            content: message.content.clone(),
            sender,
            reciever,
            created_at: message.created_at,
            updated_at: message.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    NewChap,
    NewMess,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub read: bool,
    pub user: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub novel: Option<String>,
    #[serde(default)]
    pub chap: Option<u32>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(rename = "createdAt", with = "iso_millis")]
    pub created_at: Timestamp,
    #[serde(rename = "updatedAt", with = "iso_millis")]
    pub updated_at: Timestamp,
}

impl Notification {
    pub fn new_message(user: &str, sender: &str) -> Self {
        Self::blank(NotificationKind::NewMess, user).with_sender(sender)
    }

    pub fn new_chapter(user: &str, novel_id: &str, novel_slug: &str, chap: u32) -> Self {
        let mut noti = Self::blank(NotificationKind::NewChap, user);
        noti.novel = Some(novel_id.to_string());
        noti.chap = Some(chap);
        noti.link = Some(format!("/truyen/{}/{}", novel_slug, chap));
        noti
    }

    fn blank(kind: NotificationKind, user: &str) -> Self {
        let ts = now();
        Self {
            id: new_id(),
            kind,
            read: false,
            user: user.to_string(),
            link: None,
            novel: None,
            chap: None,
            sender: None,
            created_at: ts,
            updated_at: ts,
        }
    }

    fn with_sender(mut self, sender: &str) -> Self {
        self.sender = Some(sender.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationView {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub read: bool,
    pub user: String,
    pub link: Option<String>,
    pub novel: Option<NovelBrief>,
    pub chap: Option<u32>,
    pub sender: Option<UserBrief>,
    #[serde(rename = "createdAt", with = "iso_millis")]
    pub created_at: Timestamp,
}

impl NotificationView {
    pub fn assemble(
        noti: &Notification,
        novel: Option<NovelBrief>,
        sender: Option<UserBrief>,
    ) -> Self {
        Self {
            id: noti.id.clone(),
            kind: noti.kind,
            read: noti.read,
            user: noti.user.clone(),
            link: noti.link.clone(),
            novel,
            chap: noti.chap,
            sender,
            created_at: noti.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NotificationFeed {
    pub notis: Vec<NotificationView>,
    /// Unread notifications in total, not only in `notis`.
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_use_wire_names() {
        let noti = Notification::new_chapter("u1", "n1", "dau-pha", 12);
        let json = serde_json::to_value(&noti).unwrap();
        assert_eq!(json["type"], "newchap");
        assert_eq!(json["link"], "/truyen/dau-pha/12");
        assert_eq!(json["read"], false);

        let mess = Notification::new_message("u2", "u1");
        assert_eq!(serde_json::to_value(&mess).unwrap()["type"], "newmess");
    }
}
