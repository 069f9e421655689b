use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;

use super::{QuestionRepository, ScoreRepository, ensure_success, rank_leaderboard};
use crate::config::FirestoreConfig;
use crate::content::{QuestionRecord, normalize_records};
use crate::error::RepositoryError;
use crate::quiz::LeaderboardEntry;

const QUESTIONS_COLLECTION: &str = "questions";
const LEADERBOARD_COLLECTION: &str = "leaderboard";
const PAGE_SIZE: &str = "300";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    document: Option<Document>,
}

/// Turns a Firestore REST typed value (`{"stringValue": "x"}` and friends)
/// into plain JSON.
pub fn decode_value(value: &Value) -> Value {
    let Some(typed) = value.as_object() else {
        return Value::Null;
    };

    if let Some(s) = typed.get("stringValue") {
        return s.clone();
    }
    if let Some(raw) = typed.get("integerValue") {
        // 64-bit integers travel as strings.
        return match raw {
            Value::String(s) => s
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(s.clone())),
            other => other.clone(),
        };
    }
    if let Some(d) = typed.get("doubleValue") {
        return d.clone();
    }
    if let Some(b) = typed.get("booleanValue") {
        return b.clone();
    }
    if let Some(t) = typed.get("timestampValue") {
        return t.clone();
    }
    if let Some(map) = typed.get("mapValue") {
        return map
            .get("fields")
            .and_then(Value::as_object)
            .map(decode_fields)
            .unwrap_or_else(|| Value::Object(Map::new()));
    }
    if let Some(array) = typed.get("arrayValue") {
        let values = array
            .get("values")
            .and_then(Value::as_array)
            .map(|values| values.iter().map(decode_value).collect())
            .unwrap_or_default();
        return Value::Array(values);
    }
    if let Some(reference) = typed.get("referenceValue") {
        return reference.clone();
    }
    Value::Null
}

pub fn decode_fields(fields: &Map<String, Value>) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(name, value)| (name.clone(), decode_value(value)))
            .collect(),
    )
}

/// Document body for a new leaderboard entry.
pub fn encode_entry(entry: &LeaderboardEntry) -> Value {
    json!({
        "fields": {
            "player_name": { "stringValue": entry.player_name },
            "score": { "integerValue": entry.score.to_string() },
            "total_questions_in_quiz": { "integerValue": entry.total_questions_in_quiz.to_string() },
            "created_at": { "timestampValue": entry.created_at.to_rfc3339() },
        }
    })
}

fn decode_entry(document: &Document) -> Option<LeaderboardEntry> {
    match serde_json::from_value(decode_fields(&document.fields)) {
        Ok(entry) => Some(entry),
        Err(e) => {
            tracing::warn!(error = %e, "Skipping malformed leaderboard document");
            None
        }
    }
}

/// Questions and leaderboard stored in Cloud Firestore, spoken to over its
/// REST API with the project's web API key.
#[derive(Debug, Clone)]
pub struct FirestoreRepository {
    client: Client,
    documents_url: String,
    api_key: String,
}

impl FirestoreRepository {
    pub fn new(config: FirestoreConfig) -> Result<Self, RepositoryError> {
        if config.project_id.trim().is_empty() || config.api_key.trim().is_empty() {
            return Err(RepositoryError::Config(
                "Firestore project_id and api_key must not be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RepositoryError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            documents_url: format!(
                "https://firestore.googleapis.com/v1/projects/{}/databases/(default)/documents",
                config.project_id.trim()
            ),
            api_key: config.api_key,
        })
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.documents_url, collection)
    }

    fn list_request(&self, page_token: Option<&str>) -> RequestBuilder {
        let mut request = self
            .client
            .get(self.collection_url(QUESTIONS_COLLECTION))
            .query(&[("key", self.api_key.as_str()), ("pageSize", PAGE_SIZE)]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        request
    }

    fn insert_request(&self, entry: &LeaderboardEntry) -> RequestBuilder {
        self.client
            .post(self.collection_url(LEADERBOARD_COLLECTION))
            .query(&[("key", self.api_key.as_str())])
            .json(&encode_entry(entry))
    }

    fn leaderboard_query_request(&self, question_count: usize) -> RequestBuilder {
        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": LEADERBOARD_COLLECTION }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": "total_questions_in_quiz" },
                        "op": "EQUAL",
                        "value": { "integerValue": question_count.to_string() }
                    }
                }
            }
        });

        self.client
            .post(format!("{}:runQuery", self.documents_url))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
    }

    fn fetch_error(url: &str) -> impl FnOnce(reqwest::Error) -> RepositoryError + '_ {
        move |e| RepositoryError::HttpFetch {
            url: url.to_string(),
            source: e,
        }
    }
}

#[async_trait]
impl QuestionRepository for FirestoreRepository {
    #[tracing::instrument(skip(self), fields(firestore.collection = QUESTIONS_COLLECTION))]
    async fn load_questions(&self) -> Result<Vec<QuestionRecord>, RepositoryError> {
        let url = self.collection_url(QUESTIONS_COLLECTION);
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let response = self
                .list_request(page_token.as_deref())
                .send()
                .await
                .map_err(Self::fetch_error(&url))?;
            let page: ListDocumentsResponse = ensure_success(&url, response)
                .await?
                .json()
                .await
                .map_err(Self::fetch_error(&url))?;

            tracing::debug!(page.documents = page.documents.len(), "Fetched Firestore page");
            documents.extend(page.documents);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        let values = documents
            .iter()
            .map(|document| decode_fields(&document.fields))
            .collect();
        let records = normalize_records(values);
        tracing::info!(questions.count = records.len(), "Questions loaded from Firestore");
        Ok(records)
    }

    fn backend_name(&self) -> &'static str {
        "firestore"
    }
}

#[async_trait]
impl ScoreRepository for FirestoreRepository {
    #[tracing::instrument(skip(self, entry), fields(player.name = %entry.player_name))]
    async fn save_score(&self, entry: &LeaderboardEntry) -> Result<(), RepositoryError> {
        let url = self.collection_url(LEADERBOARD_COLLECTION);
        let response = self
            .insert_request(entry)
            .send()
            .await
            .map_err(Self::fetch_error(&url))?;
        ensure_success(&url, response).await?;
        Ok(())
    }

    /// Filters on the server and orders here, so no composite index is needed.
    #[tracing::instrument(skip(self))]
    async fn fetch_leaderboard(
        &self,
        question_count: usize,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, RepositoryError> {
        let url = format!("{}:runQuery", self.documents_url);
        let response = self
            .leaderboard_query_request(question_count)
            .send()
            .await
            .map_err(Self::fetch_error(&url))?;
        let items: Vec<RunQueryItem> = ensure_success(&url, response)
            .await?
            .json()
            .await
            .map_err(Self::fetch_error(&url))?;

        let entries = items
            .iter()
            .filter_map(|item| item.document.as_ref())
            .filter_map(decode_entry);
        Ok(rank_leaderboard(entries, question_count, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn repository() -> FirestoreRepository {
        FirestoreRepository::new(FirestoreConfig {
            project_id: "quiz-demo".to_string(),
            api_key: "web-key".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_decode_question_document() {
        let fields = json!({
            "question_text": { "stringValue": "Capital of Peru?" },
            "correct_answer_key": { "stringValue": "b" },
            "explanation": { "nullValue": null },
            "options": { "arrayValue": { "values": [
                { "mapValue": { "fields": {
                    "key": { "stringValue": "a" }, "text": { "stringValue": "Quito" }
                } } },
                { "mapValue": { "fields": {
                    "key": { "stringValue": "b" }, "text": { "stringValue": "Lima" }
                } } }
            ] } }
        });

        let decoded = decode_fields(fields.as_object().unwrap());
        assert_eq!(decoded["question_text"], "Capital of Peru?");
        assert_eq!(decoded["options"][1]["text"], "Lima");
        assert!(decoded["explanation"].is_null());

        let records = normalize_records(vec![decoded]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].correct_answer_key, "b");
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode_value(&json!({ "integerValue": "42" })), json!(42));
        assert_eq!(decode_value(&json!({ "doubleValue": 1.5 })), json!(1.5));
        assert_eq!(decode_value(&json!({ "booleanValue": true })), json!(true));
        assert_eq!(decode_value(&json!({ "arrayValue": {} })), json!([]));
        assert_eq!(decode_value(&json!({ "mapValue": {} })), json!({}));
        assert_eq!(decode_value(&json!("bare")), Value::Null);
    }

    #[test]
    fn test_entry_encodes_and_decodes() {
        let entry = LeaderboardEntry {
            player_name: "Ana".to_string(),
            score: 12,
            total_questions_in_quiz: 15,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
        };

        let encoded = encode_entry(&entry);
        assert_eq!(encoded["fields"]["score"]["integerValue"], "12");
        assert_eq!(
            encoded["fields"]["created_at"]["timestampValue"],
            "2024-05-01T12:30:00+00:00"
        );

        let document: Document = serde_json::from_value(encoded).unwrap();
        assert_eq!(decode_entry(&document), Some(entry));
    }

    #[test]
    fn test_list_request_pages() {
        let first = repository().list_request(None).build().unwrap();
        assert_eq!(
            first.url().as_str(),
            "https://firestore.googleapis.com/v1/projects/quiz-demo/databases/(default)/documents/questions?key=web-key&pageSize=300"
        );

        let next = repository().list_request(Some("abc")).build().unwrap();
        assert!(next.url().as_str().ends_with("&pageToken=abc"));
    }

    #[test]
    fn test_leaderboard_query_filters_on_length() {
        let request = repository().leaderboard_query_request(10).build().unwrap();
        assert!(request.url().path().ends_with("/documents:runQuery"));

        let body: Value =
            serde_json::from_slice(request.body().unwrap().as_bytes().unwrap()).unwrap();
        let filter = &body["structuredQuery"]["where"]["fieldFilter"];
        assert_eq!(filter["field"]["fieldPath"], "total_questions_in_quiz");
        assert_eq!(filter["value"]["integerValue"], "10");
    }

    #[test]
    fn test_malformed_leaderboard_document_is_skipped() {
        let document = Document {
            fields: json!({ "player_name": { "stringValue": "Ana" } })
                .as_object()
                .unwrap()
                .clone(),
        };
        assert_eq!(decode_entry(&document), None);
    }
}
