//! Activity catalog lookup and session binding.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::session::Binding;
use crate::store::TimerStore;
use crate::types::{ActivityId, ActivityRef, Rate, WorkOrderId};

/// Category used for free-text reasons.
pub const OTHER_CATEGORY: &str = "other";

/// Billing metadata for a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityInfo {
    pub title: String,
    #[serde(default)]
    pub billable: bool,
    #[serde(default)]
    pub rate: Rate,
    #[serde(default)]
    pub category: String,
}

/// Source of selectable work orders and activities.
///
/// The catalog's contents are supplied from outside; this crate only reads
/// them.
pub trait ActivityCatalog {
    /// Looks up a catalog reference. Returns `None` when it is unknown or when
    /// the reference is not a catalog item.
    fn lookup(&self, reference: &ActivityRef) -> Option<ActivityInfo>;
}

/// A work order as listed in a catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrderItem {
    pub id: WorkOrderId,
    #[serde(flatten)]
    pub info: ActivityInfo,
}

/// A quick activity as listed in a catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickActivityItem {
    pub id: ActivityId,
    #[serde(flatten)]
    pub info: ActivityInfo,
}

/// In-memory catalog, deserializable from JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticCatalog {
    #[serde(default)]
    pub work_orders: Vec<WorkOrderItem>,
    #[serde(default)]
    pub activities: Vec<QuickActivityItem>,
}

impl StaticCatalog {
    /// Number of items across both lists.
    pub fn len(&self) -> usize {
        self.work_orders.len() + self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indexes the catalog for lookups.
    pub fn index(&self) -> CatalogIndex {
        let mut items = HashMap::with_capacity(self.len());
        for item in &self.work_orders {
            items.insert(ActivityRef::WorkOrder(item.id.clone()), item.info.clone());
        }
        for item in &self.activities {
            items.insert(ActivityRef::QuickActivity(item.id.clone()), item.info.clone());
        }
        CatalogIndex { items }
    }
}

/// Hash-indexed view of a [`StaticCatalog`].
#[derive(Debug, Clone, Default)]
pub struct CatalogIndex {
    items: HashMap<ActivityRef, ActivityInfo>,
}

impl ActivityCatalog for CatalogIndex {
    fn lookup(&self, reference: &ActivityRef) -> Option<ActivityInfo> {
        self.items.get(reference).cloned()
    }
}

/// Resolves `reference` against `catalog` into a binding.
///
/// Unknown catalog references resolve to an empty, non-billable binding
/// instead of an error; selection lists should only offer valid references,
/// but a stale one must not break the command.
pub fn resolve(catalog: &dyn ActivityCatalog, reference: ActivityRef) -> Binding {
    match reference {
        ActivityRef::None => Binding::default(),
        ActivityRef::OtherReason(text) => Binding {
            task_name: text.clone(),
            activity: ActivityRef::OtherReason(text),
            billable: false,
            rate: Rate::ZERO,
            category: OTHER_CATEGORY.to_string(),
        },
        ActivityRef::WorkOrder(_) | ActivityRef::QuickActivity(_) => {
            match catalog.lookup(&reference) {
                Some(info) => Binding {
                    activity: reference,
                    task_name: info.title,
                    billable: info.billable,
                    rate: info.rate,
                    category: info.category,
                },
                None => {
                    warn!(
                        activity = %reference,
                        "activity not found in catalog; binding as non-billable"
                    );
                    Binding {
                        activity: reference,
                        ..Binding::default()
                    }
                }
            }
        }
    }
}

/// Resolves `reference` and binds it to the store's session.
pub fn bind(store: &mut TimerStore, catalog: &dyn ActivityCatalog, reference: ActivityRef) -> bool {
    store.bind_activity(resolve(catalog, reference))
}
