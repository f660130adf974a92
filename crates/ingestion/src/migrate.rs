//! Category migration
//!
//! Maps stored product categories onto the site taxonomy. Rows already in
//! the taxonomy are left alone, so re-running is a no-op.

use serde::Serialize;
use srcent_common::catalog::normalize_category;
use srcent_common::db::ProductStore;
use srcent_common::metrics;
use tracing::{info, warn};

use crate::errors::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

pub async fn migrate_categories(store: &dyn ProductStore, dry_run: bool) -> Result<MigrationSummary> {
    let products = store.list_products(None).await?;
    info!(count = products.len(), dry_run, "Migrating categories");

    let mut summary = MigrationSummary::default();
    for product in products {
        let current = product.category.as_deref();
        let target = normalize_category(current);

        if current == Some(target) {
            summary.unchanged += 1;
            continue;
        }

        if dry_run {
            info!(slug = %product.slug, from = current.unwrap_or(""), to = target, "Would update category");
            summary.updated += 1;
            continue;
        }

        match store.update_category(product.id, target).await {
            Ok(()) => {
                info!(slug = %product.slug, from = current.unwrap_or(""), to = target, "Category updated");
                metrics::record_ingestion_task("category", "updated");
                summary.updated += 1;
            }
            Err(e) => {
                warn!(slug = %product.slug, error = %e, "Category update failed");
                metrics::record_ingestion_task("category", "failed");
                summary.failed += 1;
            }
        }
    }

    info!(
        updated = summary.updated,
        unchanged = summary.unchanged,
        failed = summary.failed,
        dry_run,
        "Category migration complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use srcent_common::db::models::ProductStatus;
    use srcent_common::testing::{sample_product, InMemoryStore};

    fn store_with(categories: &[(&str, Option<&str>)]) -> InMemoryStore {
        let store = InMemoryStore::new();
        for (slug, category) in categories {
            let mut product = sample_product(slug, ProductStatus::Published);
            product.category = category.map(str::to_string);
            store.put_product(product);
        }
        store
    }

    fn category(store: &InMemoryStore, slug: &str) -> Option<String> {
        store.product(slug).and_then(|p| p.category)
    }

    #[tokio::test]
    async fn test_migration_maps_and_is_idempotent() {
        let store = store_with(&[
            ("a", Some("编程开发")),
            ("b", Some("文本")),
            ("c", Some("区块链")),
            ("d", None),
            ("e", Some("")),
        ]);

        let first = migrate_categories(&store, false).await.unwrap();
        assert_eq!(first, MigrationSummary { updated: 4, unchanged: 1, failed: 0 });

        assert_eq!(category(&store, "a").as_deref(), Some("编程开发"));
        assert_eq!(category(&store, "b").as_deref(), Some("写作辅助"));
        assert_eq!(category(&store, "c").as_deref(), Some("其他类型"));
        assert_eq!(category(&store, "d").as_deref(), Some("其他类型"));
        assert_eq!(category(&store, "e").as_deref(), Some("其他类型"));

        let second = migrate_categories(&store, false).await.unwrap();
        assert_eq!(second, MigrationSummary { updated: 0, unchanged: 5, failed: 0 });
    }

    #[tokio::test]
    async fn test_dry_run_does_not_write() {
        let store = store_with(&[("a", Some("图像")), ("b", Some("视频创作"))]);

        let summary = migrate_categories(&store, true).await.unwrap();

        assert_eq!(summary, MigrationSummary { updated: 1, unchanged: 1, failed: 0 });
        assert_eq!(category(&store, "a").as_deref(), Some("图像"));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_an_error() {
        let store = store_with(&[("a", Some("图像"))]);
        store.set_failing(true);
        assert!(migrate_categories(&store, false).await.is_err());
    }
}
