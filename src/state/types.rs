use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Keys that stay on this device and never reach the cloud.
pub const LOCAL_ONLY_FIELDS: &[&str] = &["darkMode"];

pub type ItemId = u64;

/// Names a shared remote record; travels in share links as `?couple=`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoupleId(pub String);

impl CoupleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CoupleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CoupleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppState {
    pub onboarded: bool,
    pub partner1: String,
    pub partner2: String,
    pub anniversary: String,
    pub couple_photo: Option<String>,
    pub timeline: Vec<Milestone>,
    pub love_letter: LoveLetter,
    pub reasons: Vec<Reason>,
    pub quiz: Quiz,
    pub bucket_list: Vec<BucketItem>,
    pub gift_box: GiftBox,
    pub dark_mode: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            onboarded: false,
            partner1: String::new(),
            partner2: String::new(),
            anniversary: String::new(),
            couple_photo: None,
            timeline: vec![],
            love_letter: LoveLetter::default(),
            reasons: vec![],
            quiz: Quiz::default(),
            bucket_list: vec![],
            gift_box: GiftBox::default(),
            dark_mode: false,
        }
    }
}

impl AppState {
    /// The document as sent to the cloud: local-only keys removed.
    pub fn cloud_payload(&self) -> serde_json::Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            for key in LOCAL_ONLY_FIELDS {
                map.remove(*key);
            }
        }
        Ok(value)
    }

    pub fn anniversary_date(&self) -> Option<NaiveDate> {
        parse_date(&self.anniversary)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Milestone {
    pub id: ItemId,
    pub title: String,
    pub date: String,
    pub description: String,
    pub icon: String,
    pub photo: Option<String>,
}

impl Default for Milestone {
    fn default() -> Self {
        Self {
            id: 0,
            title: String::new(),
            date: String::new(),
            description: String::new(),
            icon: "Custom".into(),
            photo: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoveLetter {
    pub message: String,
    pub opened: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Reason {
    pub id: ItemId,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizQuestion {
    pub id: ItemId,
    pub q: String,
    pub a: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Quiz {
    pub questions: Vec<QuizQuestion>,
    /// Question index → submitted answer
    pub answers: BTreeMap<usize, String>,
    pub score: u32,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    #[default]
    Travel,
    Food,
    Adventures,
    Milestones,
    /// Anything this build does not know about
    #[serde(other)]
    Other,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Travel,
        Category::Food,
        Category::Adventures,
        Category::Milestones,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(s.trim()))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Travel => "Travel",
            Category::Food => "Food",
            Category::Adventures => "Adventures",
            Category::Milestones => "Milestones",
            Category::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketItem {
    pub id: ItemId,
    pub text: String,
    pub category: Category,
    pub done: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GiftBox {
    pub message: String,
    pub photo: Option<String>,
    pub coupons: Vec<String>,
    pub opened: bool,
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    // Accept bare dates and full timestamps
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

/// Mint a list item id from the wall clock, bumped past every id in use.
pub fn mint_id(existing: impl IntoIterator<Item = ItemId>) -> ItemId {
    let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let taken: BTreeSet<ItemId> = existing.into_iter().collect();
    match taken.last() {
        Some(&max) if max >= now => max
            .checked_add(1)
            // Imported data may already sit at the top of the range
            .or_else(|| (now..=ItemId::MAX).find(|id| !taken.contains(id)))
            .or_else(|| (0..now).find(|id| !taken.contains(id)))
            .unwrap_or_default(),
        _ => now,
    }
}
