//! Adapter for `figment` providers

use super::Gatherer;
use crate::error::SourceError;
use crate::tree::RawTree;
use figment::Figment;

/// Any [`Figment`] as one source, for layouts the built-in gatherers do not
/// cover. The figment's own merge order applies inside the source.
#[derive(Debug, Clone)]
pub struct FigmentGatherer {
    name: String,
    figment: Figment,
}

impl FigmentGatherer {
    pub fn new(name: impl Into<String>, figment: Figment) -> Self {
        Self { name: name.into(), figment }
    }
}

impl Gatherer for FigmentGatherer {
    fn name(&self) -> String {
        format!("Figment ({})", self.name)
    }

    fn gather(&self) -> Result<RawTree, SourceError> {
        self.figment.extract::<RawTree>().map_err(|e| SourceError::Provider(Box::new(e)))
    }
}
