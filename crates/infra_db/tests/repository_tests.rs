//! Integration tests for the generic repository over the in-memory store

use core_kernel::{CoreError, EntityState, Filter, IncludePaths, KeyValue, KeyValues, OrderBy};
use serde_json::Value;
use infra_db::{MemoryStore, UnitOfWorkFactory};
use rust_decimal_macros::dec;
use test_utils::{
    assert_identity_conflict, assert_invalid_argument, assert_sorted_by, assert_state,
    memory_factory, seed_fixtures, CatalogFixtures, Customer, Note, NoteFixtures, Order,
    OrderFixtures, OrderLine, Product, ProductBuilder, Unmapped,
};

async fn seeded() -> (MemoryStore, UnitOfWorkFactory) {
    let (store, factory) = memory_factory();
    seed_fixtures(&factory).await.unwrap();
    (store, factory)
}

mod staging_tests {
    use super::*;

    #[tokio::test]
    async fn test_add_is_visible_to_get_by_id_before_save() {
        let (store, factory) = memory_factory();
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        products.add(CatalogFixtures::widget()).unwrap();

        assert_eq!(products.get_by_id(1i64).unwrap(), Some(CatalogFixtures::widget()));
        assert_state(&products, &CatalogFixtures::widget(), EntityState::Added);
        assert_eq!(store.row_count("products"), 0);
    }

    #[tokio::test]
    async fn test_adding_a_tracked_key_is_an_identity_conflict() {
        let (_, factory) = memory_factory();
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        products.add(CatalogFixtures::widget()).unwrap();
        let renamed = ProductBuilder::new().with_name("Other").build();

        assert_identity_conflict(products.add(renamed));
    }

    #[tokio::test]
    async fn test_add_range_stages_nothing_on_duplicate() {
        let (_, factory) = memory_factory();
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        let result = products.add_range([
            CatalogFixtures::gadget(),
            CatalogFixtures::widget(),
            CatalogFixtures::widget(),
        ]);

        assert_identity_conflict(result);
        assert_state(&products, &CatalogFixtures::gadget(), EntityState::Detached);
        assert_eq!(uow.save_changes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_state_transitions_through_save() {
        let (_, factory) = memory_factory();
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();
        let widget = CatalogFixtures::widget();

        products.add(widget.clone()).unwrap();
        assert_state(&products, &widget, EntityState::Added);

        uow.save_changes().await.unwrap();
        assert_state(&products, &widget, EntityState::Unchanged);

        products.update(ProductBuilder::new().with_stock(5).build()).unwrap();
        assert_state(&products, &widget, EntityState::Modified);

        products.delete(&widget).unwrap();
        assert_state(&products, &widget, EntityState::Deleted);
    }

    #[tokio::test]
    async fn test_update_of_added_entity_stays_added() {
        let (store, factory) = memory_factory();
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        products.add(CatalogFixtures::widget()).unwrap();
        products.update(ProductBuilder::new().with_stock(1).build()).unwrap();

        assert_state(&products, &CatalogFixtures::widget(), EntityState::Added);
        assert_eq!(uow.save_changes().await.unwrap(), 1);
        assert_eq!(store.rows("products")[0]["stock"], 1);
    }

    #[tokio::test]
    async fn test_unmapped_entities_are_written_keyless() {
        let (store, factory) = memory_factory();
        let uow = factory.open().await.unwrap();

        uow.repository::<Unmapped>().add(Unmapped { id: 1 }).unwrap();
        uow.repository::<Unmapped>().add(Unmapped { id: 1 }).unwrap();

        assert_eq!(uow.save_changes().await.unwrap(), 2);
        assert_eq!(store.row_count("unmapped"), 2);
    }
}

mod lookup_tests {
    use super::*;

    #[tokio::test]
    async fn test_get_by_id_tracks_the_result() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        let found = products.get_by_id(2i64).unwrap().unwrap();

        assert_eq!(found, CatalogFixtures::gadget());
        assert_state(&products, &found, EntityState::Unchanged);
    }

    #[tokio::test]
    async fn test_get_by_id_returns_tracked_values() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        let renamed = ProductBuilder::new().with_name("Widget Pro").build();
        products.update(renamed.clone()).unwrap();

        assert_eq!(products.get_by_id_async(1i64).await.unwrap(), Some(renamed));
    }

    #[tokio::test]
    async fn test_get_by_id_missing_key() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();

        assert_eq!(uow.repository::<Product>().get_by_id(999i64).unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_by_id_with_wrong_arity_finds_nothing() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();

        let found = uow.repository::<Product>().get_by_id((1i64, 2i64)).unwrap();

        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_get_by_id_rejects_empty_and_null_keys() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        assert_invalid_argument(products.get_by_id(KeyValues::default()));
        assert_invalid_argument(products.get_by_id(KeyValue::from_json(Value::Null)));
    }

    #[tokio::test]
    async fn test_get_by_id_requires_key_metadata() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();

        assert_invalid_argument(uow.repository::<Note>().get_by_id_async(1i64).await);
    }

    #[tokio::test]
    async fn test_composite_keys_follow_declared_order() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();
        let lines = uow.repository::<OrderLine>();

        let line = lines.get_by_id((100i64, 2i32)).unwrap().unwrap();
        assert_eq!(line.product_id, CatalogFixtures::gadget().id);

        assert_eq!(lines.get_by_id((2i32, 100i64)).unwrap(), None);
    }

    #[tokio::test]
    async fn test_key_values_are_type_sensitive() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();

        assert_eq!(uow.repository::<Product>().get_by_id("1").unwrap(), None);
    }
}

mod delete_tests {
    use super::*;

    #[tokio::test]
    async fn test_delete_detached_entity() {
        let (store, factory) = seeded().await;
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        products.delete(&CatalogFixtures::widget()).unwrap();

        assert_eq!(products.get_by_id(1i64).unwrap(), None);
        assert_eq!(uow.save_changes().await.unwrap(), 1);
        assert_eq!(store.row_count("products"), 2);
    }

    #[tokio::test]
    async fn test_delete_of_added_entity_forgets_it() {
        let (store, factory) = memory_factory();
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        products.add(CatalogFixtures::widget()).unwrap();
        products.delete(&CatalogFixtures::widget()).unwrap();

        assert_state(&products, &CatalogFixtures::widget(), EntityState::Detached);
        assert_eq!(uow.save_changes().await.unwrap(), 0);
        assert_eq!(store.row_count("products"), 0);
    }

    #[tokio::test]
    async fn test_re_adding_a_deleted_key_stages_an_update() {
        let (store, factory) = seeded().await;
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();
        let replacement = ProductBuilder::new().with_name("Widget II").build();

        products.delete(&CatalogFixtures::widget()).unwrap();
        products.add(replacement.clone()).unwrap();

        assert_state(&products, &replacement, EntityState::Modified);
        uow.save_changes().await.unwrap();
        assert_eq!(store.rows("products")[0]["name"], "Widget II");
    }

    #[tokio::test]
    async fn test_delete_by_id() {
        let (store, factory) = seeded().await;
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        products.delete_by_id(2i64).await.unwrap();
        products.delete_by_id(999i64).await.unwrap();

        assert_eq!(uow.save_changes().await.unwrap(), 1);
        assert_eq!(store.row_count("products"), 2);
    }

    #[tokio::test]
    async fn test_keyless_entities_cannot_be_deleted() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();

        assert_invalid_argument(uow.repository::<Note>().delete(&NoteFixtures::reminder()));
    }
}

mod query_tests {
    use super::*;

    #[tokio::test]
    async fn test_get_all_in_store_order() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();

        let products = uow.repository::<Product>().get(None, None, "").await.unwrap();

        assert_eq!(products, CatalogFixtures::products());
    }

    #[tokio::test]
    async fn test_get_filtered_and_ordered() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();

        let products = uow
            .repository::<Product>()
            .get(
                Some(Filter::new(|p: &Product| p.price >= dec!(5))),
                Some(OrderBy::desc(|p: &Product| p.price)),
                IncludePaths::none(),
            )
            .await
            .unwrap();

        let ids: Vec<i64> = products.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_get_projected_filters_orders_then_projects() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();

        let names = uow
            .repository::<Product>()
            .get_projected(
                Some(Filter::new(|p: &Product| p.stock > 0)),
                |p| p.name.clone(),
                Some(OrderBy::asc(|p: &Product| p.name.clone())),
                "",
            )
            .await
            .unwrap();

        assert_eq!(names, vec!["Gadget".to_string(), "Widget".to_string()]);
    }

    #[tokio::test]
    async fn test_first_or_default() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        let cheap = products
            .first_or_default(Filter::new(|p: &Product| p.price < dec!(5)), "")
            .await
            .unwrap();
        assert_eq!(cheap, Some(CatalogFixtures::gizmo()));

        let none = products
            .first_or_default(Filter::new(|p: &Product| p.price > dec!(1000)), "")
            .await
            .unwrap();
        assert_eq!(none, None);

        let id = products
            .first_or_default_projected(Filter::new(|p: &Product| p.stock == 10), |p| p.id, "")
            .await
            .unwrap();
        assert_eq!(id, Some(2));
    }

    #[tokio::test]
    async fn test_queries_skip_entities_staged_for_deletion() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        products.delete(&CatalogFixtures::widget()).unwrap();

        let remaining = products.get(None, None, "").await.unwrap();
        assert_eq!(remaining.len(), 2);
        let first = products.first_or_default(Filter::all(), "").await.unwrap();
        assert_eq!(first, Some(CatalogFixtures::gadget()));
    }

    #[tokio::test]
    async fn test_ordered_queries_page_after_skipping_staged_deletions() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        products.delete(&CatalogFixtures::widget()).unwrap();

        let by_id = || OrderBy::asc(|p: &Product| p.id);
        let first = uow
            .query::<Product>()
            .order_by(by_id())
            .first_or_default()
            .await
            .unwrap();
        assert_eq!(first, Some(CatalogFixtures::gadget()));

        let page = uow
            .query::<Product>()
            .order_by(by_id())
            .take(1)
            .to_list()
            .await
            .unwrap();
        assert_eq!(page, vec![CatalogFixtures::gadget()]);

        let rest = uow
            .query::<Product>()
            .order_by(by_id())
            .skip(1)
            .to_list()
            .await
            .unwrap();
        assert_eq!(rest, vec![CatalogFixtures::gizmo()]);

        let untracked = uow
            .query_no_tracking::<Product>()
            .order_by(by_id())
            .first_or_default()
            .await
            .unwrap();
        assert_eq!(untracked, Some(CatalogFixtures::widget()));
    }

    #[tokio::test]
    async fn test_tracked_queries_return_tracked_values() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        products
            .update(ProductBuilder::new().with_name("Widget Pro").build())
            .unwrap();

        let listed = products.get(None, None, "").await.unwrap();
        assert_eq!(listed[0].name, "Widget Pro");
    }

    #[tokio::test]
    async fn test_untracked_queries_leave_the_tracker_alone() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();

        let listed = uow.query_no_tracking::<Product>().to_list().await.unwrap();

        assert_eq!(listed.len(), 3);
        assert_state(&uow.repository::<Product>(), &listed[0], EntityState::Detached);
    }

    #[tokio::test]
    async fn test_query_paging() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();

        let page = uow
            .query::<Product>()
            .order_by(OrderBy::asc(|p: &Product| p.price))
            .skip(1)
            .take(1)
            .to_list()
            .await
            .unwrap();

        assert_eq!(page, vec![CatalogFixtures::widget()]);
    }

    #[tokio::test]
    async fn test_repeated_filters_combine() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();

        let count = uow
            .query::<Product>()
            .filter(|p| p.stock > 0)
            .filter(|p| p.price < dec!(10))
            .count()
            .await
            .unwrap();

        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_projection_over_ordered_query() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();

        let names = uow
            .query::<Product>()
            .order_by(OrderBy::desc(|p: &Product| p.stock))
            .select(|p| p.name.clone())
            .to_list()
            .await
            .unwrap();

        assert_eq!(names, vec!["Widget", "Gadget", "Gizmo"]);
    }

    #[tokio::test]
    async fn test_sorted_fixture_prices() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();

        let products = uow
            .repository::<Product>()
            .get(None, Some(OrderBy::asc(|p: &Product| p.price)), "")
            .await
            .unwrap();

        assert_sorted_by(&products, |p| p.price);
    }
}

mod include_tests {
    use super::*;

    #[tokio::test]
    async fn test_include_references_and_nested_collections() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();

        let orders = uow
            .repository::<Order>()
            .get(
                None,
                Some(OrderBy::asc(|o: &Order| o.id)),
                "customer, lines.product",
            )
            .await
            .unwrap();

        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].customer, Some(OrderFixtures::alice()));
        assert_eq!(orders[0].lines.len(), 2);
        assert_eq!(orders[0].lines[0].product, Some(CatalogFixtures::widget()));
        assert_eq!(orders[0].lines[1].product, Some(CatalogFixtures::gadget()));
        assert_eq!(orders[1].customer, Some(OrderFixtures::bob()));
        assert!(orders[1].lines.is_empty());
    }

    #[tokio::test]
    async fn test_navigations_stay_empty_without_include() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();

        let order = uow
            .repository::<Order>()
            .get_by_id_async(100i64)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(order.customer, None);
        assert!(order.lines.is_empty());
    }

    #[tokio::test]
    async fn test_include_merges_shared_prefixes() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();

        let order = uow
            .query::<Order>()
            .include("lines")
            .include(["lines.product", "customer"])
            .filter(|o| o.id == 100)
            .first_or_default()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(order.lines.len(), 2);
        assert!(order.lines.iter().all(|line| line.product.is_some()));
        assert_eq!(order.customer.map(|c| c.name), Some("Alice".to_string()));
    }

    #[tokio::test]
    async fn test_related_rows_are_not_tracked() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();

        let orders = uow.repository::<Order>().get(None, None, "customer").await.unwrap();
        let alice = orders[0].customer.clone().unwrap();

        assert_state(&uow.repository::<Customer>(), &alice, EntityState::Detached);
        assert_state(&uow.repository::<Order>(), &orders[0], EntityState::Unchanged);
    }

    #[tokio::test]
    async fn test_unknown_navigation_is_rejected() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();

        let result = uow.repository::<Order>().get(None, None, "lines.supplier").await;

        assert_invalid_argument(result);
    }

    #[tokio::test]
    async fn test_include_on_unregistered_type_is_rejected() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();

        let result = uow.repository::<Unmapped>().get(None, None, "anything").await;

        assert_invalid_argument(result);
    }

    #[tokio::test]
    async fn test_blank_include_segments_are_ignored() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();

        let orders = uow.repository::<Order>().get(None, None, " , customer ,").await.unwrap();

        assert!(orders.iter().all(|o| o.customer.is_some()));
    }
}

mod aggregate_tests {
    use super::*;

    #[tokio::test]
    async fn test_any_and_counts() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        assert!(products.any(Filter::new(|p: &Product| p.stock == 0)).await.unwrap());
        assert!(!products.any(Filter::new(|p: &Product| p.price > dec!(100))).await.unwrap());
        assert_eq!(products.count(Filter::new(|p: &Product| p.stock > 0)).await.unwrap(), 2);
        assert_eq!(products.count_long(Filter::all()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_max() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        assert_eq!(products.max(|p| p.price).await.unwrap(), dec!(24.50));
        assert_eq!(
            products
                .max_filtered(Filter::new(|p: &Product| p.stock == 0), |p| p.price)
                .await
                .unwrap(),
            dec!(4.25)
        );
    }

    #[tokio::test]
    async fn test_max_over_empty_collection() {
        let (_, factory) = memory_factory();
        let uow = factory.open().await.unwrap();

        let result = uow.repository::<Product>().max(|p| p.stock).await;

        assert!(matches!(result, Err(CoreError::EmptySequence)));
    }

    #[tokio::test]
    async fn test_aggregates_use_stored_values() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        products.add(ProductBuilder::new().with_id(50).build()).unwrap();

        assert_eq!(products.count_long(Filter::all()).await.unwrap(), 3);
    }
}

mod merge_tests {
    use super::*;

    #[tokio::test]
    async fn test_detached_edit_persists_across_units_of_work() {
        let (_, factory) = memory_factory();
        let original = ProductBuilder::new().with_id(1).with_name("a").build();

        let mut first = factory.open().await.unwrap();
        first.repository::<Product>().add(original.clone()).unwrap();
        assert_eq!(first.commit().await.unwrap(), 1);

        let mut second = factory.open().await.unwrap();
        let mut edited = original.clone();
        edited.name = "b".to_string();
        second
            .repository::<Product>()
            .update_if_not_tracked(edited.clone())
            .await
            .unwrap();
        assert_eq!(second.commit().await.unwrap(), 1);

        let third = factory.open().await.unwrap();
        let stored = third.repository::<Product>().get_by_id_async(1i64).await.unwrap();
        assert_eq!(stored, Some(edited));
    }

    #[tokio::test]
    async fn test_update_if_not_tracked_merges_onto_stored_row() {
        let (store, factory) = seeded().await;
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();
        let detached = ProductBuilder::new().with_stock(42).build();

        products.update_if_not_tracked(detached.clone()).await.unwrap();

        assert_state(&products, &detached, EntityState::Modified);
        assert_eq!(uow.save_changes().await.unwrap(), 1);
        assert_eq!(store.rows("products")[0]["stock"], 42);
    }

    #[tokio::test]
    async fn test_update_if_not_tracked_with_identical_values_is_unchanged() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        products
            .update_if_not_tracked(CatalogFixtures::widget())
            .await
            .unwrap();

        assert_state(&products, &CatalogFixtures::widget(), EntityState::Unchanged);
        assert_eq!(uow.save_changes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tracked_values_win_over_detached_copy() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        products.get_by_id(1i64).unwrap();
        products
            .update_if_not_tracked(ProductBuilder::new().with_stock(0).build())
            .await
            .unwrap();

        assert_eq!(products.get_by_id(1i64).unwrap(), Some(CatalogFixtures::widget()));
        assert_eq!(uow.save_changes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_if_not_tracked_leaves_navigations_alone() {
        let (store, factory) = seeded().await;
        let uow = factory.open().await.unwrap();
        let mut order = OrderFixtures::alice_order();
        order.total = dec!(50);
        order.customer = Some(OrderFixtures::bob());

        uow.repository::<Order>().update_if_not_tracked(order).await.unwrap();
        uow.save_changes().await.unwrap();

        let stored = &store.rows("orders")[0];
        assert!(stored.get("customer").is_none());
        assert_eq!(stored["customer_id"], OrderFixtures::alice().id);
    }

    #[tokio::test]
    async fn test_update_if_not_tracked_missing_row() {
        let (_, factory) = seeded().await;
        let uow = factory.open().await.unwrap();

        let result = uow
            .repository::<Product>()
            .update_if_not_tracked(ProductBuilder::new().with_id(404).build())
            .await;

        assert!(matches!(result, Err(CoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_keyless_entity_is_written_whole_once() {
        let (store, factory) = seeded().await;

        for _ in 0..2 {
            let uow = factory.open().await.unwrap();
            uow.repository::<Note>()
                .update_if_not_tracked(NoteFixtures::reminder())
                .await
                .unwrap();
            uow.save_changes().await.unwrap();
        }

        assert_eq!(store.row_count("notes"), 1);
    }
}
