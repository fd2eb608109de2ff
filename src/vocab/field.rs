use crate::error::{SubtokenError, SubtokenResult};

/// CoNLL-U field a subtoken vocabulary reads.
///
/// This is the whole difference between the field vocabularies: which column
/// to read and how to turn its value into countable subtokens.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Debug,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Field {
    Form,
    Lemma,
    Upos,
    Xpos,
    Deprel,
    /// Enhanced dependency graph, `head:rel|head:rel`.
    Deps,
}

impl Field {
    pub const ALL: [Self; 6] = [
        Self::Form,
        Self::Lemma,
        Self::Upos,
        Self::Xpos,
        Self::Deprel,
        Self::Deps,
    ];

    /// Lowercase field name, the key of this field's feed entry.
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Zero-based CoNLL-U column.
    pub fn conllu_idx(self) -> usize {
        match self {
            Self::Form => 1,
            Self::Lemma => 2,
            Self::Upos => 3,
            Self::Xpos => 4,
            Self::Deprel => 7,
            Self::Deps => 8,
        }
    }

    /// Splits a column value into the strings whose characters get counted.
    pub fn subtokens(self, value: &str) -> SubtokenResult<Vec<&str>> {
        match self {
            Self::Deps => graph_labels(value),
            _ => Ok(vec![value]),
        }
    }
}

/// Relation labels of a `head:rel|head:rel` column, heads dropped.
pub fn graph_labels(value: &str) -> SubtokenResult<Vec<&str>> {
    if value == "_" {
        return Ok(Vec::new());
    }
    value
        .split('|')
        .map(|edge| {
            edge.split_once(':')
                .map(|(_head, rel)| rel)
                .ok_or_else(|| SubtokenError::MalformedEdge {
                    edge: edge.to_owned(),
                })
        })
        .collect()
}
