// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the view every work object starts with.
pub const DEFAULT_VIEW: &str = "_InitialView";

/// A typed annotation: a type name plus its feature values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub type_name: String,
    pub features: BTreeMap<String, String>,
}

impl FeatureRecord {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            features: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.features.insert(key.into(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct View {
    pub document: String,
    pub annotations: Vec<FeatureRecord>,
}

/// Per-document analysis context lent out by the work object pool.
///
/// A work object may hold several named views. The pool tracks only the base
/// id, which stays fixed for the object's whole life and is shared by all views.
#[derive(Debug)]
pub struct WorkObject {
    base_id: Uuid,
    views: Vec<(String, View)>,
    active: usize,
    owner: Option<String>,
    payload_capacity: usize,
}

impl WorkObject {
    pub(crate) fn new(payload_capacity: usize) -> Self {
        let mut obj = Self {
            base_id: Uuid::new_v4(),
            views: Vec::new(),
            active: 0,
            owner: None,
            payload_capacity,
        };
        obj.reset();
        obj
    }

    /// Identity tracked by the pool.
    pub fn id(&self) -> Uuid {
        self.base_id
    }

    /// Context that currently holds this object.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn active_view(&self) -> &str {
        &self.views[self.active].0
    }

    pub fn view_names(&self) -> impl Iterator<Item = &str> {
        self.views.iter().map(|(name, _)| name.as_str())
    }

    /// Create `name` if needed and make it the active view.
    pub fn switch_view(&mut self, name: &str) {
        self.active = match self.views.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                self.views.push((name.to_string(), View::default()));
                self.views.len() - 1
            }
        };
    }

    pub fn view(&self) -> &View {
        &self.views[self.active].1
    }

    pub fn document(&self) -> &str {
        &self.view().document
    }

    pub fn set_document(&mut self, text: &str) {
        let doc = &mut self.views[self.active].1.document;
        doc.clear();
        doc.push_str(text);
    }

    pub fn annotations(&self) -> &[FeatureRecord] {
        &self.view().annotations
    }

    pub fn add_annotation(&mut self, record: FeatureRecord) {
        self.views[self.active].1.annotations.push(record);
    }

    pub fn replace_annotations(&mut self, records: Vec<FeatureRecord>) {
        self.views[self.active].1.annotations = records;
    }

    /// Install the borrowing context. Runs inside the pool's per-context critical section.
    pub(crate) fn install(&mut self, owner: &str) {
        self.owner = Some(owner.to_string());
        self.active = 0;
    }

    /// Clear all content so the object can be lent again.
    pub(crate) fn reset(&mut self) {
        self.owner = None;
        self.views.truncate(1);
        match self.views.first_mut() {
            Some((name, view)) => {
                name.clear();
                name.push_str(DEFAULT_VIEW);
                view.document.clear();
                view.annotations.clear();
            }
            None => self.views.push((
                DEFAULT_VIEW.to_string(),
                View {
                    document: String::with_capacity(self.payload_capacity),
                    annotations: Vec::new(),
                },
            )),
        }
        self.active = 0;
    }
}
