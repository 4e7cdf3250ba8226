//! Linked shader program interface consumed by the input layout cache.

/// Component class of a declared shader input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderInputType {
    /// Floating point (`vec*`, `float`).
    Float,
    /// Signed integer (`ivec*`, `int`).
    Int,
    /// Unsigned integer (`uvec*`, `uint`).
    Uint,
}

/// One active vertex shader input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderAttribute {
    /// Input name as declared in the shader.
    pub name: String,
    /// Attribute location the application binds data to.
    pub location: u32,
    /// Semantic index assigned by the shader translator.
    pub semantic_index: u32,
    /// Component class the shader reads.
    pub input_type: ShaderInputType,
}

impl ShaderAttribute {
    /// Create an attribute whose semantic index equals its location.
    pub fn new(name: impl Into<String>, location: u32, input_type: ShaderInputType) -> Self {
        Self {
            name: name.into(),
            location,
            semantic_index: location,
            input_type,
        }
    }

    /// Override the semantic index.
    pub fn with_semantic_index(mut self, semantic_index: u32) -> Self {
        self.semantic_index = semantic_index;
        self
    }
}

/// Vertex stage linkage of a program.
///
/// # Example
///
/// ```ignore
/// let program = ShaderProgram::new()
///     .with_label("sprite")
///     .with_attribute(ShaderAttribute::new("a_position", 0, ShaderInputType::Float))
///     .with_point_size(true);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderProgram {
    label: Option<String>,
    attributes: Vec<ShaderAttribute>,
    uses_point_size: bool,
}

impl ShaderProgram {
    /// Create a program with no active attributes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Add an active attribute.
    pub fn with_attribute(mut self, attribute: ShaderAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Mark whether the vertex shader writes `gl_PointSize`.
    pub fn with_point_size(mut self, uses_point_size: bool) -> Self {
        self.uses_point_size = uses_point_size;
        self
    }

    /// Get the debug label, if set.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// All active attributes.
    pub fn attributes(&self) -> &[ShaderAttribute] {
        &self.attributes
    }

    /// Active attribute bound to a location.
    pub fn attribute_at(&self, location: u32) -> Option<&ShaderAttribute> {
        self.attributes.iter().find(|a| a.location == location)
    }

    /// Whether a location is read by the shader.
    pub fn is_attribute_active(&self, location: u32) -> bool {
        self.attribute_at(location).is_some()
    }

    /// Whether the vertex shader writes `gl_PointSize`.
    pub fn uses_point_size(&self) -> bool {
        self.uses_point_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_lookup() {
        let program = ShaderProgram::new()
            .with_attribute(ShaderAttribute::new("a_color", 3, ShaderInputType::Float).with_semantic_index(0))
            .with_attribute(ShaderAttribute::new("a_position", 0, ShaderInputType::Float));

        assert!(program.is_attribute_active(3));
        assert!(!program.is_attribute_active(1));
        assert_eq!(program.attribute_at(3).unwrap().semantic_index, 0);
        assert_eq!(program.attribute_at(0).unwrap().name, "a_position");
    }
}
