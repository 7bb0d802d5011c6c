//! Firestore REST client for the character collection.
//!
//! Lists documents page by page and maps each document's typed field values
//! onto [`Character`]. Malformed documents are skipped, never fatal.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::error::RemoteError;
use super::RemoteSource;
use crate::model::{self, Character, Species, Status};

/// Documents requested per page.
const PAGE_SIZE: u32 = 300;

/// Connection settings for a Firestore collection.
#[derive(Debug, Clone)]
pub struct FirestoreOptions {
    pub base_url: String,
    pub project_id: String,
    pub collection: String,
    pub api_key: Option<String>,
}

pub struct FirestoreSource {
    client: Client,
    options: FirestoreOptions,
}

impl std::fmt::Debug for FirestoreSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreSource")
            .field("project_id", &self.options.project_id)
            .field("collection", &self.options.collection)
            .field("api_key", &self.options.api_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl FirestoreSource {
    pub fn new(client: Client, options: FirestoreOptions) -> Result<Self, RemoteError> {
        if options.project_id.trim().is_empty() {
            return Err(RemoteError::Config(
                "a Firestore project id is required".to_string(),
            ));
        }
        if options.collection.trim().is_empty() || options.collection.contains('/') {
            return Err(RemoteError::Config(format!(
                "invalid collection name '{}'",
                options.collection
            )));
        }
        Ok(Self { client, options })
    }

    /// REST endpoint listing the collection's documents.
    fn documents_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/databases/(default)/documents/{}",
            self.options.base_url.trim_end_matches('/'),
            self.options.project_id,
            self.options.collection
        )
    }

    async fn fetch_page(
        &self,
        url: &str,
        page_token: Option<&str>,
    ) -> Result<ListDocumentsResponse, RemoteError> {
        let mut query: Vec<(&str, String)> = vec![("pageSize", PAGE_SIZE.to_string())];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        if let Some(key) = &self.options.api_key {
            query.push(("key", key.clone()));
        }

        let response = self.client.get(url).query(&query).send().await?;
        if !response.status().is_success() {
            return Err(RemoteError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl RemoteSource for FirestoreSource {
    async fn list_characters(&self) -> Result<Vec<Character>, RemoteError> {
        let url = self.documents_url();
        let mut characters = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let page = self.fetch_page(&url, page_token.as_deref()).await?;
            pages += 1;
            tracing::debug!(
                page = pages,
                documents = page.documents.len(),
                "Fetched character page"
            );

            characters.extend(page.documents.iter().filter_map(document_to_character));

            match page.next_page_token {
                Some(next) if !next.is_empty() && page_token.as_deref() != Some(&next) => {
                    page_token = Some(next);
                }
                _ => break,
            }
        }

        tracing::info!(count = characters.len(), pages, "Fetched remote characters");
        Ok(characters)
    }
}

fn string_field<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields.get(key)?.get("stringValue")?.as_str()
}

/// Map a Firestore document to a character.
///
/// The storage key (last segment of the document name) is the id unless the
/// payload embeds its own `id`. Missing fields take the record defaults;
/// unknown enum values or unusable ids drop the document.
fn document_to_character(doc: &Document) -> Option<Character> {
    let storage_key = doc.name.rsplit('/').next().unwrap_or_default();
    let id = string_field(&doc.fields, "id")
        .filter(|id| !id.is_empty())
        .unwrap_or(storage_key)
        .to_string();

    if !model::is_usable_id(&id) {
        tracing::warn!(document = %doc.name, "Skipping document with unusable id");
        return None;
    }

    let status = match string_field(&doc.fields, "status") {
        None => Status::Unknown,
        Some(raw) => match Status::from_str(raw) {
            Some(s) => s,
            None => {
                tracing::warn!(id = %id, status = raw, "Skipping document with unknown status");
                return None;
            }
        },
    };

    let species = match string_field(&doc.fields, "species") {
        None => Species::Human,
        Some(raw) => match Species::from_str(raw) {
            Some(s) => s,
            None => {
                tracing::warn!(id = %id, species = raw, "Skipping document with unknown species");
                return None;
            }
        },
    };

    Some(Character {
        name: string_field(&doc.fields, "name").unwrap_or_default().to_string(),
        image_url: string_field(&doc.fields, "imageUrl")
            .unwrap_or_default()
            .to_string(),
        id,
        status,
        species,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::mirror::fetch::tests::serve;

    fn parse(value: Value) -> Vec<Character> {
        let page: ListDocumentsResponse = serde_json::from_value(value).unwrap();
        page.documents.iter().filter_map(document_to_character).collect()
    }

    fn options() -> FirestoreOptions {
        FirestoreOptions {
            base_url: "https://firestore.googleapis.com/".to_string(),
            project_id: "rick-and-morty".to_string(),
            collection: "characters".to_string(),
            api_key: Some("secret".to_string()),
        }
    }

    #[test]
    fn test_documents_url() {
        let source = FirestoreSource::new(Client::new(), options()).unwrap();
        assert_eq!(
            source.documents_url(),
            "https://firestore.googleapis.com/v1/projects/rick-and-morty/databases/(default)/documents/characters"
        );
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let source = FirestoreSource::new(Client::new(), options()).unwrap();
        let printed = format!("{:?}", source);
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn test_new_rejects_missing_project() {
        let mut opts = options();
        opts.project_id = " ".to_string();
        assert!(matches!(
            FirestoreSource::new(Client::new(), opts),
            Err(RemoteError::Config(_))
        ));
    }

    #[test]
    fn test_new_rejects_nested_collection() {
        let mut opts = options();
        opts.collection = "a/b".to_string();
        assert!(FirestoreSource::new(Client::new(), opts).is_err());
    }

    #[test]
    fn test_parse_full_document() {
        let characters = parse(json!({
            "documents": [{
                "name": "projects/p/databases/(default)/documents/characters/a",
                "fields": {
                    "name": {"stringValue": "Rick"},
                    "status": {"stringValue": "ALIVE"},
                    "species": {"stringValue": "HUMAN"},
                    "imageUrl": {"stringValue": "http://x/a.jpg"}
                },
                "createTime": "2024-01-01T00:00:00Z",
                "updateTime": "2024-01-01T00:00:00Z"
            }]
        }));
        assert_eq!(
            characters,
            vec![Character {
                id: "a".to_string(),
                name: "Rick".to_string(),
                image_url: "http://x/a.jpg".to_string(),
                status: Status::Alive,
                species: Species::Human,
            }]
        );
    }

    #[test]
    fn test_parse_empty_collection() {
        assert!(parse(json!({})).is_empty());
    }

    #[test]
    fn test_embedded_id_overrides_storage_key() {
        let characters = parse(json!({
            "documents": [{
                "name": "projects/p/databases/(default)/documents/characters/key1",
                "fields": {"id": {"stringValue": "embedded"}}
            }]
        }));
        assert_eq!(characters[0].id, "embedded");
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let characters = parse(json!({
            "documents": [{"name": "projects/p/databases/(default)/documents/characters/b"}]
        }));
        let c = &characters[0];
        assert_eq!(c.id, "b");
        assert_eq!(c.name, "");
        assert_eq!(c.image_url, "");
        assert_eq!(c.status, Status::Unknown);
        assert_eq!(c.species, Species::Human);
    }

    #[test]
    fn test_unknown_enum_skips_document() {
        let characters = parse(json!({
            "documents": [
                {
                    "name": "projects/p/databases/(default)/documents/characters/a",
                    "fields": {"species": {"stringValue": "DRAGON"}}
                },
                {
                    "name": "projects/p/databases/(default)/documents/characters/b",
                    "fields": {"status": {"stringValue": "zombie"}}
                },
                {
                    "name": "projects/p/databases/(default)/documents/characters/c",
                    "fields": {"species": {"stringValue": "ROBOT"}, "status": {"stringValue": "DEAD"}}
                }
            ]
        }));
        assert_eq!(characters.len(), 1);
        assert_eq!(characters[0].id, "c");
        assert_eq!(characters[0].species, Species::Robot);
        assert_eq!(characters[0].status, Status::Dead);
    }

    #[test]
    fn test_unusable_id_skips_document() {
        let characters = parse(json!({
            "documents": [{
                "name": "projects/p/databases/(default)/documents/characters/ok",
                "fields": {"id": {"stringValue": ".."}}
            }, {
                "name": "projects/p/databases/(default)/documents/characters/ab",
                "fields": {"id": {"stringValue": "a:b"}}
            }]
        }));
        assert!(characters.is_empty());
    }

    #[test]
    fn test_next_page_token_parsed() {
        let page: ListDocumentsResponse =
            serde_json::from_value(json!({"documents": [], "nextPageToken": "abc"})).unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));
    }

    fn local_source(base_url: String) -> FirestoreSource {
        let mut opts = options();
        opts.base_url = base_url;
        FirestoreSource::new(Client::new(), opts).unwrap()
    }

    fn doc(id: &str, name: &str) -> Value {
        json!({
            "name": format!("projects/p/databases/(default)/documents/characters/{id}"),
            "fields": {"name": {"stringValue": name}, "status": {"stringValue": "ALIVE"}}
        })
    }

    #[tokio::test]
    async fn test_follows_next_page_token() {
        let first = json!({"documents": [doc("a", "Rick")], "nextPageToken": "p2"});
        let second = json!({"documents": [doc("b", "Morty")]});
        let (base, seen) =
            serve(vec![(200, first.to_string()), (200, second.to_string())]).await;

        let characters = local_source(base).list_characters().await.unwrap();
        let ids: Vec<&str> = characters.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].starts_with(
            "GET /v1/projects/rick-and-morty/databases/(default)/documents/characters?"
        ));
        assert!(seen[0].contains("pageSize=300"));
        assert!(seen[0].contains("key=secret"));
        assert!(!seen[0].contains("pageToken"));
        assert!(seen[1].contains("pageToken=p2"));
    }

    #[tokio::test]
    async fn test_empty_collection_over_http() {
        let (base, seen) = serve(vec![(200, "{}".to_string())]).await;
        let characters = local_source(base).list_characters().await.unwrap();
        assert!(characters.is_empty());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_error_status_maps_to_http_status() {
        let (base, _) = serve(vec![(403, "{\"error\": {}}".to_string())]).await;
        let err = local_source(base).list_characters().await.unwrap_err();
        assert!(matches!(err, RemoteError::HttpStatus { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_error() {
        let (base, _) = serve(vec![(200, "not json".to_string())]).await;
        let err = local_source(base).list_characters().await.unwrap_err();
        assert!(matches!(err, RemoteError::Json(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_http_error() {
        let mut opts = options();
        opts.base_url = "http://127.0.0.1:1".to_string();
        let source = FirestoreSource::new(Client::new(), opts).unwrap();
        let err = source.list_characters().await.unwrap_err();
        assert!(matches!(err, RemoteError::Http(_)));
    }
}
