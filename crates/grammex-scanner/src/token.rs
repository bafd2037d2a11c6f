//! Tokens produced by the step lexer.

use grammex_grammar::TermId;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A lexed token. Offsets are absolute byte offsets into the document.
///
/// When several terminals match the same longest text, `kind` is the
/// preferred one (literals before patterns, then declaration order) and the
/// rest are kept in `alternatives`, in the same order. The parser decides
/// which one the input actually is.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    #[serde(with = "term_id")]
    pub kind: TermId,
    pub start: u32,
    pub end: u32,
    #[serde(with = "term_ids", default, skip_serializing_if = "SmallVec::is_empty")]
    pub alternatives: SmallVec<[TermId; 2]>,
}

impl Token {
    pub fn new(kind: TermId, start: u32, end: u32) -> Self {
        Token {
            kind,
            start,
            end,
            alternatives: SmallVec::new(),
        }
    }

    pub fn with_alternatives(mut self, alternatives: impl IntoIterator<Item = TermId>) -> Self {
        self.alternatives.extend(alternatives);
        self
    }

    /// The same token read as `kind`, without alternatives.
    pub fn as_kind(&self, kind: TermId) -> Token {
        Token::new(kind, self.start, self.end)
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.kind == TermId::EOF
    }

    /// Every terminal this token may be, preferred first.
    pub fn candidates(&self) -> impl Iterator<Item = TermId> + '_ {
        std::iter::once(self.kind).chain(self.alternatives.iter().copied())
    }

    /// Position of `term` among the candidates, 0 for `kind`.
    pub fn rank(&self, term: TermId) -> Option<usize> {
        self.candidates().position(|candidate| candidate == term)
    }

    #[inline]
    pub fn can_be(&self, term: TermId) -> bool {
        self.kind == term || self.alternatives.contains(&term)
    }

    /// Slice of `source` covered by this token.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source
            .get(self.start as usize..self.end as usize)
            .unwrap_or_default()
    }
}

mod term_id {
    use grammex_grammar::TermId;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &TermId, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u32(id.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<TermId, D::Error> {
        u32::deserialize(d).map(TermId)
    }
}

mod term_ids {
    use grammex_grammar::TermId;
    use serde::{Deserialize, Deserializer, Serializer};
    use smallvec::SmallVec;

    pub fn serialize<S: Serializer>(ids: &SmallVec<[TermId; 2]>, s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(ids.iter().map(|id| id.0))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SmallVec<[TermId; 2]>, D::Error> {
        Vec::<u32>::deserialize(d).map(|ids| ids.into_iter().map(TermId).collect())
    }
}
