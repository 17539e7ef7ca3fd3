use serde::Serialize;
use shared::domain::{ParentRef, Unit, UnitType};
use tracing::warn;

use crate::registry::RegistryClient;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitsOfType {
    pub unit_type: &'static UnitType,
    pub units: Vec<Unit>,
}

/// Units of a parent grouped by type, in catalog order. Types whose fetch
/// failed are absent; types with no units are present and empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnitsByType {
    pub entries: Vec<UnitsOfType>,
    pub failed_types: Vec<&'static str>,
}

impl UnitsByType {
    pub fn get(&self, unit_type: &str) -> Option<&[Unit]> {
        self.entries
            .iter()
            .find(|entry| entry.unit_type.key == unit_type)
            .map(|entry| entry.units.as_slice())
    }

    pub fn total(&self) -> usize {
        self.entries.iter().map(|entry| entry.units.len()).sum()
    }
}

/// Loads the "units" tab of a detail view, one type at a time.
pub async fn load_units_by_type(registry: &RegistryClient, parent: ParentRef) -> UnitsByType {
    let mut loaded = UnitsByType::default();
    for unit_type in parent.kind().catalog() {
        match registry.list_units(parent, unit_type.key).await {
            Ok(units) => loaded.entries.push(UnitsOfType { unit_type, units }),
            Err(err) => {
                warn!(
                    parent = %parent.kind(),
                    parent_id = parent.raw_id(),
                    unit_type = unit_type.key,
                    "failed to load units: {err}"
                );
                loaded.failed_types.push(unit_type.key);
            }
        }
    }
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};
    use serde_json::json;
    use shared::domain::{InstitutionId, ParentKind};
    use tokio::net::TcpListener;

    use crate::transport::ApiTransport;

    async fn spawn_units_server() -> String {
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let app = Router::new()
            .route(
                "/api/institutions/branches/",
                get(|| async {
                    Json(json!([{ "id": 1, "name": "Main", "branch_code": "M" }]))
                }),
            )
            .route(
                "/api/institutions/faculties/",
                get(|| async { Json(json!({ "results": [] })) }),
            )
            .route(
                "/api/institutions/departments/",
                get(|| async { Json(json!([])) }),
            )
            .route("/api/institutions/programmes/", get(|| async { Json(json!([])) }))
            .route("/api/institutions/divisions/", get(|| async { Json(json!([])) }))
            .route("/api/institutions/offices/", get(|| async { Json(json!([])) }))
            .route("/api/institutions/committees/", get(|| async { Json(json!([])) }));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn loads_every_type_and_skips_failures() {
        let server_url = spawn_units_server().await;
        let registry = RegistryClient::new(ApiTransport::new(server_url));

        let tab = load_units_by_type(&registry, ParentRef::Institution(InstitutionId(1))).await;

        // centres has no route and answers 404
        assert_eq!(tab.failed_types, vec!["centre"]);
        assert_eq!(
            tab.entries.len(),
            ParentKind::Institution.catalog().len() - 1
        );
        assert_eq!(tab.total(), 1);
        assert_eq!(tab.get("faculty"), Some(&[][..]));
        assert!(tab.get("centre").is_none());
    }
}
