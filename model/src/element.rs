//! Element variant model: the closed set of drawable shapes.
//!
//! DESIGN
//! ======
//! Every element shares a base attribute set (`BaseAttrs`) and adds its own
//! variant fields. The wire form is flat camelCase JSON discriminated by
//! `"type"`, so a rect looks like
//! `{"type":"rect","id":"r1","x":0,"y":0,"width":10,"height":10,"cornerRadius":2}`.
//!
//! Partial updates are forgiving: keys that are not legal for the element's
//! variant are dropped by `filter_patch` instead of rejected. `id` and `type`
//! are identity, never attributes, so neither can be changed by an update.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Flat attribute map used for partial updates.
pub type Attrs = Map<String, Value>;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ElementError {
    #[error("element type is required")]
    MissingType,
    #[error("unknown element type: {0}")]
    UnknownType(String),
    #[error("invalid element attributes: {0}")]
    InvalidAttrs(String),
    #[error("no valid fields to update")]
    NoValidFields,
}

// =============================================================================
// KIND
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Rect,
    Ellipse,
    Text,
    Line,
    Marker,
}

/// Attribute keys every variant accepts in an update.
pub const BASE_FIELDS: &[&str] = &[
    "draggable",
    "dragDistance",
    "x",
    "y",
    "rotation",
    "fill",
    "stroke",
    "strokeWidth",
    "width",
    "height",
];

impl ElementKind {
    pub const ALL: [ElementKind; 5] = [Self::Rect, Self::Ellipse, Self::Text, Self::Line, Self::Marker];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rect => "rect",
            Self::Ellipse => "ellipse",
            Self::Text => "text",
            Self::Line => "line",
            Self::Marker => "marker",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// Variant-specific attribute keys, on top of [`BASE_FIELDS`].
    #[must_use]
    pub fn extra_fields(self) -> &'static [&'static str] {
        match self {
            Self::Rect => &["cornerRadius"],
            Self::Ellipse => &[],
            Self::Text => &["svg", "content"],
            Self::Line => &["points", "tension", "lineJoin", "lineCap"],
            Self::Marker => &["points", "opacity"],
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every attribute key that may be set on an element of `kind`.
#[must_use]
pub fn permitted_fields(kind: ElementKind) -> Vec<&'static str> {
    BASE_FIELDS
        .iter()
        .chain(kind.extra_fields())
        .copied()
        .collect()
}

#[must_use]
pub fn is_permitted(kind: ElementKind, field: &str) -> bool {
    BASE_FIELDS.contains(&field) || kind.extra_fields().contains(&field)
}

/// Keep only the keys of `patch` that are legal for `kind`.
#[must_use]
pub fn filter_patch(kind: ElementKind, patch: &Attrs) -> Attrs {
    patch
        .iter()
        .filter(|(key, _)| is_permitted(kind, key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

// =============================================================================
// ATTRIBUTES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseAttrs {
    pub id: String,
    #[serde(default = "default_true")]
    pub draggable: bool,
    #[serde(default)]
    pub drag_distance: f64,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

fn default_true() -> bool {
    true
}

fn default_opacity() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineJoin {
    Miter,
    #[default]
    Round,
    Bevel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineCap {
    Butt,
    #[default]
    Round,
    Square,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rect {
    #[serde(flatten)]
    pub base: BaseAttrs,
    #[serde(default)]
    pub corner_radius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ellipse {
    #[serde(flatten)]
    pub base: BaseAttrs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    #[serde(flatten)]
    pub base: BaseAttrs,
    /// Rendered markup snapshot.
    pub svg: String,
    /// Raw rich-text source.
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    #[serde(flatten)]
    pub base: BaseAttrs,
    /// Flattened `[x0, y0, x1, y1, ...]` coordinate pairs.
    pub points: Vec<f64>,
    #[serde(default)]
    pub tension: f64,
    #[serde(default)]
    pub line_join: LineJoin,
    #[serde(default)]
    pub line_cap: LineCap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    #[serde(flatten)]
    pub base: BaseAttrs,
    pub points: Vec<f64>,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
}

// =============================================================================
// ELEMENT
// =============================================================================

/// One drawable object on a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    Rect(Rect),
    Ellipse(Ellipse),
    Text(Text),
    Line(Line),
    Marker(Marker),
}

impl Element {
    /// Build a typed element from raw client JSON.
    ///
    /// # Errors
    ///
    /// `MissingType` / `UnknownType` when the discriminator is absent or not
    /// one of the five variants, `InvalidAttrs` when required fields are
    /// missing or malformed.
    pub fn from_value(value: Value) -> Result<Self, ElementError> {
        let Some(fields) = value.as_object() else {
            return Err(ElementError::InvalidAttrs("element must be a JSON object".into()));
        };
        let kind = match fields.get("type") {
            None | Some(Value::Null) => return Err(ElementError::MissingType),
            Some(Value::String(tag)) => tag.clone(),
            Some(other) => return Err(ElementError::UnknownType(other.to_string())),
        };
        if ElementKind::parse(&kind).is_none() {
            return Err(ElementError::UnknownType(kind));
        }

        let element: Self = serde_json::from_value(value).map_err(|e| ElementError::InvalidAttrs(e.to_string()))?;
        element.validate()?;
        Ok(element)
    }

    #[must_use]
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Rect(_) => ElementKind::Rect,
            Self::Ellipse(_) => ElementKind::Ellipse,
            Self::Text(_) => ElementKind::Text,
            Self::Line(_) => ElementKind::Line,
            Self::Marker(_) => ElementKind::Marker,
        }
    }

    #[must_use]
    pub fn base(&self) -> &BaseAttrs {
        match self {
            Self::Rect(e) => &e.base,
            Self::Ellipse(e) => &e.base,
            Self::Text(e) => &e.base,
            Self::Line(e) => &e.base,
            Self::Marker(e) => &e.base,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.base().id
    }

    /// JSON form of the element. Serializing plain data cannot fail.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Merge the permitted subset of `patch` onto a copy of this element.
    ///
    /// Returns the merged element and the subset that was applied.
    ///
    /// # Errors
    ///
    /// `NoValidFields` when nothing in `patch` is legal for this variant,
    /// `InvalidAttrs` when a permitted value has the wrong shape.
    pub fn merged(&self, patch: &Attrs) -> Result<(Self, Attrs), ElementError> {
        let applied = filter_patch(self.kind(), patch);
        if applied.is_empty() {
            return Err(ElementError::NoValidFields);
        }

        let mut value = self.to_value();
        if let Some(fields) = value.as_object_mut() {
            for (key, v) in &applied {
                fields.insert(key.clone(), v.clone());
            }
        }

        let merged = Self::from_value(value)?;
        Ok((merged, applied))
    }

    /// Current values of the given attribute keys, `null` where unset.
    /// Used to build an inverse patch before an optimistic update.
    #[must_use]
    pub fn snapshot_attrs(&self, keys: impl IntoIterator<Item = impl AsRef<str>>) -> Attrs {
        let value = self.to_value();
        let mut out = Attrs::new();
        for key in keys {
            let key = key.as_ref();
            let current = value.get(key).cloned().unwrap_or(Value::Null);
            out.insert(key.to_owned(), current);
        }
        out
    }

    fn validate(&self) -> Result<(), ElementError> {
        if self.id().trim().is_empty() {
            return Err(ElementError::InvalidAttrs("id must not be empty".into()));
        }
        match self {
            Self::Line(line) if line.points.len() % 2 != 0 => {
                Err(ElementError::InvalidAttrs("points must hold x,y pairs".into()))
            }
            Self::Marker(marker) if marker.points.len() % 2 != 0 => {
                Err(ElementError::InvalidAttrs("points must hold x,y pairs".into()))
            }
            Self::Marker(marker) if !(0.0..=1.0).contains(&marker.opacity) => {
                Err(ElementError::InvalidAttrs(format!("opacity {} outside 0..=1", marker.opacity)))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "element_test.rs"]
mod tests;
