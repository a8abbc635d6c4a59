use crate::types::{ToolCatalogEntry, ToolDescriptor, ToolKind};

impl From<&ToolDescriptor> for ToolCatalogEntry {
    fn from(descriptor: &ToolDescriptor) -> Self {
        Self {
            kind: ToolKind::Function,
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            parameters: descriptor.input_schema.clone(),
        }
    }
}

/// Converts remote tool descriptors into function tools, one for one and in
/// the same order. Schemas are passed through without inspection.
pub fn adapt(descriptors: &[ToolDescriptor]) -> Vec<ToolCatalogEntry> {
    descriptors.iter().map(ToolCatalogEntry::from).collect()
}
