//! Typed edits to the shared document, one per user-facing feature.

use serde_json::json;

use super::container::AppStore;
use super::types::{
    mint_id, parse_date, BucketItem, Category, ItemId, Milestone, QuizQuestion, Reason,
};
use crate::error::{KeepsakeError, Result};

pub const MAX_REASONS: usize = 52;

fn required(value: &str, what: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(KeepsakeError::Invalid(format!("{} is required", what)));
    }
    Ok(value.to_string())
}

pub fn complete_onboarding(
    store: &AppStore,
    partner1: &str,
    partner2: &str,
    anniversary: &str,
) -> Result<()> {
    let partner1 = required(partner1, "partner1")?;
    let partner2 = required(partner2, "partner2")?;
    let anniversary = anniversary.trim();
    if !anniversary.is_empty() && parse_date(anniversary).is_none() {
        return Err(KeepsakeError::Invalid(format!(
            "anniversary {:?} is not a YYYY-MM-DD date",
            anniversary
        )));
    }
    store.merge(json!({
        "onboarded": true,
        "partner1": partner1,
        "partner2": partner2,
        "anniversary": anniversary,
    }))
}

#[derive(Debug, Clone, Default)]
pub struct NewMilestone {
    pub title: String,
    pub date: String,
    pub description: String,
    pub icon: Option<String>,
    pub photo: Option<String>,
}

/// Adds a milestone and keeps the timeline ordered by date.
pub fn add_milestone(store: &AppStore, new: NewMilestone) -> Result<ItemId> {
    let title = required(&new.title, "title")?;
    let date = required(&new.date, "date")?;
    if parse_date(&date).is_none() {
        return Err(KeepsakeError::Invalid(format!("date {:?} is not a YYYY-MM-DD date", date)));
    }
    let mut id = 0;
    store.update(|s| {
        id = mint_id(s.timeline.iter().map(|m| m.id));
        s.timeline.push(Milestone {
            id,
            title,
            date,
            description: new.description.trim().to_string(),
            icon: new.icon.unwrap_or_else(|| "Custom".into()),
            photo: new.photo,
        });
        s.timeline.sort_by_key(|m| parse_date(&m.date));
    })?;
    Ok(id)
}

pub fn remove_milestone(store: &AppStore, id: ItemId) -> Result<bool> {
    let mut removed = false;
    store.update(|s| {
        let before = s.timeline.len();
        s.timeline.retain(|m| m.id != id);
        removed = s.timeline.len() != before;
    })?;
    Ok(removed)
}

pub fn add_reason(store: &AppStore, text: &str) -> Result<ItemId> {
    let text = required(text, "reason")?;
    if store.get().reasons.len() >= MAX_REASONS {
        return Err(KeepsakeError::Invalid(format!(
            "all {} reason cards are filled",
            MAX_REASONS
        )));
    }
    let mut id = 0;
    store.update(|s| {
        id = mint_id(s.reasons.iter().map(|r| r.id));
        s.reasons.push(Reason { id, text });
    })?;
    Ok(id)
}

pub fn remove_reason(store: &AppStore, id: ItemId) -> Result<bool> {
    let mut removed = false;
    store.update(|s| {
        let before = s.reasons.len();
        s.reasons.retain(|r| r.id != id);
        removed = s.reasons.len() != before;
    })?;
    Ok(removed)
}

pub fn add_bucket_item(store: &AppStore, text: &str, category: Category) -> Result<ItemId> {
    let text = required(text, "bucket list item")?;
    let mut id = 0;
    store.update(|s| {
        id = mint_id(s.bucket_list.iter().map(|b| b.id));
        s.bucket_list.push(BucketItem {
            id,
            text,
            category,
            done: false,
        });
    })?;
    Ok(id)
}

/// Flips the item's done flag and returns the new value.
pub fn toggle_bucket_item(store: &AppStore, id: ItemId) -> Result<bool> {
    let mut done = None;
    store.update(|s| {
        if let Some(item) = s.bucket_list.iter_mut().find(|b| b.id == id) {
            item.done = !item.done;
            done = Some(item.done);
        }
    })?;
    done.ok_or_else(|| KeepsakeError::NotFound(format!("bucket list item {}", id)))
}

pub fn remove_bucket_item(store: &AppStore, id: ItemId) -> Result<bool> {
    let mut removed = false;
    store.update(|s| {
        let before = s.bucket_list.len();
        s.bucket_list.retain(|b| b.id != id);
        removed = s.bucket_list.len() != before;
    })?;
    Ok(removed)
}

/// `(done, total)`
pub fn bucket_progress(items: &[BucketItem]) -> (usize, usize) {
    (items.iter().filter(|b| b.done).count(), items.len())
}

pub fn add_question(store: &AppStore, question: &str, answer: &str) -> Result<ItemId> {
    let q = required(question, "question")?;
    let a = required(answer, "answer")?;
    let mut id = 0;
    store.update(|s| {
        id = mint_id(s.quiz.questions.iter().map(|q| q.id));
        s.quiz.questions.push(QuizQuestion { id, q, a });
    })?;
    Ok(id)
}

pub fn remove_question(store: &AppStore, id: ItemId) -> Result<bool> {
    let mut removed = false;
    store.update(|s| {
        let before = s.quiz.questions.len();
        s.quiz.questions.retain(|q| q.id != id);
        removed = s.quiz.questions.len() != before;
    })?;
    Ok(removed)
}

/// Clears answers and score for a fresh round.
pub fn start_quiz(store: &AppStore) -> Result<()> {
    if store.get().quiz.questions.is_empty() {
        return Err(KeepsakeError::Invalid("the quiz has no questions".into()));
    }
    store.merge_nested("quiz", json!({"completed": false, "score": 0, "answers": {}}))
}

/// Lenient comparison: either side containing the other, ignoring case.
pub fn answers_match(given: &str, correct: &str) -> bool {
    let given = given.trim().to_lowercase();
    let correct = correct.trim().to_lowercase();
    if given.is_empty() || correct.is_empty() {
        return false;
    }
    given.contains(&correct) || correct.contains(&given)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub correct: bool,
    pub score: u32,
    pub completed: bool,
}

/// Records the answer to question `index`; answering the last question
/// completes the round.
pub fn submit_answer(store: &AppStore, index: usize, answer: &str) -> Result<AnswerOutcome> {
    let answer = required(answer, "answer")?;
    let quiz = store.get().quiz;
    let question = quiz
        .questions
        .get(index)
        .ok_or_else(|| KeepsakeError::NotFound(format!("quiz question {}", index)))?;
    let correct = answers_match(&answer, &question.a);
    let completed = index + 1 >= quiz.questions.len();
    let mut score = quiz.score;

    store.update(|s| {
        s.quiz.answers.insert(index, answer);
        if correct {
            s.quiz.score += 1;
        }
        if completed {
            s.quiz.completed = true;
        }
        score = s.quiz.score;
    })?;

    Ok(AnswerOutcome {
        correct,
        score,
        completed,
    })
}

/// Saving a letter seals it again.
pub fn save_letter(store: &AppStore, message: &str) -> Result<()> {
    store.merge_nested("loveLetter", json!({"message": message, "opened": false}))
}

pub fn open_letter(store: &AppStore) -> Result<()> {
    store.merge_nested("loveLetter", json!({"opened": true}))
}

pub fn save_gift(
    store: &AppStore,
    message: &str,
    photo: Option<String>,
    coupons: Vec<String>,
) -> Result<()> {
    let coupons: Vec<String> = coupons
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    store.merge_nested(
        "giftBox",
        json!({"message": message, "photo": photo, "coupons": coupons, "opened": false}),
    )
}

pub fn open_gift(store: &AppStore) -> Result<()> {
    store.merge_nested("giftBox", json!({"opened": true}))
}

pub fn close_gift(store: &AppStore) -> Result<()> {
    store.merge_nested("giftBox", json!({"opened": false}))
}

pub fn set_couple_photo(store: &AppStore, reference: String) -> Result<()> {
    store.merge(json!({ "couplePhoto": reference }))
}

/// Returns the new dark-mode value.
pub fn toggle_dark_mode(store: &AppStore) -> Result<bool> {
    let mut dark = false;
    store.update(|s| {
        s.dark_mode = !s.dark_mode;
        dark = s.dark_mode;
    })?;
    Ok(dark)
}
