use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::engine::Component;
use crate::errors::{Error, Result};
use crate::normalization::VolumeNormalizationOptions;

type Range = Option<(DateTime<Utc>, DateTime<Utc>)>;

/// Ordered set of components simulated together.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "PortfolioRecord"))]
#[derive(Debug, Clone, Default)]
pub struct Portfolio {
    components: Vec<Component>,
    #[cfg_attr(feature = "serde", serde(skip))]
    range: OnceLock<Range>,
}

impl Portfolio {
    /// Creates a portfolio. Component ids must be unique.
    pub fn new(components: Vec<Component>) -> Result<Self> {
        let mut ids = HashSet::with_capacity(components.len());
        for component in &components {
            if !ids.insert(component.id()) {
                return Err(Error::DuplicateComponent(component.id().to_string()));
            }
        }

        Ok(Self {
            components,
            range: OnceLock::new(),
        })
    }

    /// Appends a component.
    pub fn push(&mut self, component: Component) -> Result<()> {
        if self.component(component.id()).is_some() {
            return Err(Error::DuplicateComponent(component.id().to_string()));
        }
        self.components.push(component);
        self.range = OnceLock::new();
        Ok(())
    }

    /// Returns an iterator over the components.
    pub fn components(&self) -> std::slice::Iter<'_, Component> {
        self.components.iter()
    }

    /// Returns the component with `id`.
    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.id() == id)
    }

    /// Returns the number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns `true` if there is no component.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    fn range(&self) -> Range {
        *self.range.get_or_init(|| {
            let start = self.components.iter().map(Component::backtest_start).min()?;
            let end = self.components.iter().map(Component::backtest_end).max()?;
            Some((start, end))
        })
    }

    /// Returns the earliest backtest start.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.range().map(|(start, _)| start)
    }

    /// Returns the latest backtest end.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.range().map(|(_, end)| end)
    }

    /// Computes the normalization multiplier of every component.
    pub fn prepare(&mut self, options: &VolumeNormalizationOptions) {
        for component in self.components.iter_mut() {
            component.prepare(options);
        }
    }
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct PortfolioRecord {
    components: Vec<Component>,
}

#[cfg(feature = "serde")]
impl TryFrom<PortfolioRecord> for Portfolio {
    type Error = Error;

    fn try_from(record: PortfolioRecord) -> Result<Self> {
        Self::new(record.components)
    }
}
