//! Dashboard discovery through the saved objects find API

use crate::client::{KibanaClient, KibanaError, Result, SAVED_OBJECTS_API, decode_json};
use crate::pagination::PageRequest;

use serde::Deserialize;
use std::fmt;

const FIND_DASHBOARDS_PER_PAGE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardSavedObject {
    pub id: String,
    pub title: String,
}

impl fmt::Display for DashboardSavedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (ID: {})", self.title, self.id)
    }
}

#[derive(Deserialize)]
struct FindResponse {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    saved_objects: Vec<FoundObject>,
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct FoundObject {
    id: String,
    #[serde(default)]
    attributes: TitleAttributes,
}

#[derive(Default, Deserialize)]
struct TitleAttributes {
    #[serde(default)]
    title: String,
}

impl KibanaClient {
    /// All dashboards, sorted case-insensitively by title.
    pub async fn find_dashboards(&self) -> Result<Vec<DashboardSavedObject>> {
        log::debug!("Find dashboards using the Saved Objects API");
        let mut found = Vec::new();
        let mut page = 1;
        loop {
            let request = PageRequest::new(format!("{}/_find", SAVED_OBJECTS_API))
                .param("type", "dashboard")
                .param("fields", "title")
                .param("per_page", FIND_DASHBOARDS_PER_PAGE)
                .param("page", page);
            let path = request.to_string();
            let body = self
                .get_ok("find dashboards", &request.path, &request.query_pairs())
                .await
                .map_err(|e| KibanaError::Pagination {
                    path: path.clone(),
                    source: Box::new(e),
                })?;
            let response: FindResponse = decode_json("find dashboards", &body)?;
            if !response.error.is_empty() {
                return Err(KibanaError::Rejected {
                    operation: "find dashboards".to_string(),
                    message: format!("{}: {}", response.error, response.message),
                });
            }

            let received = response.saved_objects.len();
            found.extend(response.saved_objects.into_iter().map(|o| DashboardSavedObject {
                id: o.id,
                title: o.attributes.title,
            }));
            if response.total <= found.len() {
                break;
            }
            if received == 0 {
                return Err(KibanaError::Pagination {
                    path,
                    source: Box::new(KibanaError::InvalidRequest(format!(
                        "empty page after {} of {} dashboards",
                        found.len(),
                        response.total
                    ))),
                });
            }
            page += 1;
        }

        found.sort_by_key(|d| d.title.to_lowercase());
        Ok(found)
    }
}
