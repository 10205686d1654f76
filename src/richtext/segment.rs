use std::ops::Range;

use super::{Facet, FacetFeature};

/// What a run of text represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind<'a> {
    /// Plain text
    Plain,
    /// Mention of an account
    Mention {
        /// DID of the mentioned account
        did: &'a str,
    },
    /// Hyperlink
    Link {
        /// Target URI
        uri: &'a str,
    },
    /// Hashtag
    Tag {
        /// Tag without the leading `#`
        tag: &'a str,
    },
}

/// A run of post text with its decoded meaning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    /// The covered text
    pub text: &'a str,
    /// What the text represents
    pub kind: SegmentKind<'a>,
}

/// Split `text` into typed segments according to `facets`.
///
/// Segments cover the whole text in order; concatenating their `text`
/// fields yields the input. Facets are visited by ascending start offset.
/// Ranges that are empty, overlap an earlier facet, or don't sit on char
/// boundaries are skipped, and facets whose features are all unknown
/// render as plain text.
pub fn segments<'a>(text: &'a str, facets: &'a [Facet]) -> Vec<Segment<'a>> {
    let mut ordered: Vec<&Facet> = facets.iter().collect();
    ordered.sort_by_key(|f| f.index.byte_start);

    let mut runs: Vec<(Range<usize>, SegmentKind<'a>)> = Vec::new();
    let mut cursor = 0;

    for facet in ordered {
        let start = facet.index.byte_start;
        let end = facet.index.byte_end.min(text.len());

        if start >= end || start < cursor {
            continue;
        }
        if !text.is_char_boundary(start) || !text.is_char_boundary(end) {
            continue;
        }

        if start > cursor {
            push_run(&mut runs, cursor..start, SegmentKind::Plain);
        }
        push_run(&mut runs, start..end, kind_for(&facet.features));
        cursor = end;
    }

    if cursor < text.len() {
        push_run(&mut runs, cursor..text.len(), SegmentKind::Plain);
    }

    runs.into_iter()
        .map(|(range, kind)| Segment {
            text: &text[range],
            kind,
        })
        .collect()
}

fn kind_for(features: &[FacetFeature]) -> SegmentKind<'_> {
    features
        .iter()
        .find_map(|feature| match feature {
            FacetFeature::Mention { did } => Some(SegmentKind::Mention { did }),
            FacetFeature::Link { uri } => Some(SegmentKind::Link { uri }),
            FacetFeature::Tag { tag } => Some(SegmentKind::Tag { tag }),
            FacetFeature::Unknown => None,
        })
        .unwrap_or(SegmentKind::Plain)
}

/// Append a run, merging into the previous one when both are plain
fn push_run<'a>(runs: &mut Vec<(Range<usize>, SegmentKind<'a>)>, range: Range<usize>, kind: SegmentKind<'a>) {
    if kind == SegmentKind::Plain {
        if let Some((last, SegmentKind::Plain)) = runs.last_mut() {
            if last.end == range.start {
                last.end = range.end;
                return;
            }
        }
    }
    runs.push((range, kind));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::richtext::ByteSlice;

    fn joined(segs: &[Segment<'_>]) -> String {
        segs.iter().map(|s| s.text).collect()
    }

    #[test]
    fn test_no_facets() {
        let segs = segments("plain text", &[]);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].text, "plain text");
        assert_eq!(segs[0].kind, SegmentKind::Plain);
    }

    #[test]
    fn test_empty_text() {
        assert!(segments("", &[]).is_empty());
    }

    #[test]
    fn test_mention_link_and_tag() {
        let text = "hi @alice.test see https://example.com #rust";
        let facets = vec![
            Facet::new(3, 14, FacetFeature::Mention { did: "did:plc:alice".into() }),
            Facet::new(19, 38, FacetFeature::Link { uri: "https://example.com".into() }),
            Facet::new(39, 44, FacetFeature::Tag { tag: "rust".into() }),
        ];

        let segs = segments(text, &facets);
        assert_eq!(joined(&segs), text);
        assert_eq!(segs.len(), 6);
        assert_eq!(segs[0], Segment { text: "hi ", kind: SegmentKind::Plain });
        assert_eq!(
            segs[1],
            Segment { text: "@alice.test", kind: SegmentKind::Mention { did: "did:plc:alice" } }
        );
        assert_eq!(segs[2].text, " see ");
        assert_eq!(segs[3].kind, SegmentKind::Link { uri: "https://example.com" });
        assert_eq!(segs[4].text, " ");
        assert_eq!(segs[5], Segment { text: "#rust", kind: SegmentKind::Tag { tag: "rust" } });
    }

    #[test]
    fn test_facets_out_of_order_are_sorted() {
        let text = "#a and #b";
        let facets = vec![
            Facet::new(7, 9, FacetFeature::Tag { tag: "b".into() }),
            Facet::new(0, 2, FacetFeature::Tag { tag: "a".into() }),
        ];
        let segs = segments(text, &facets);
        assert_eq!(joined(&segs), text);
        assert_eq!(segs[0].kind, SegmentKind::Tag { tag: "a" });
        assert_eq!(segs[2].kind, SegmentKind::Tag { tag: "b" });
    }

    #[test]
    fn test_multibyte_offsets_are_bytes() {
        // "héllo " is 7 bytes: 'é' takes two
        let text = "héllo #tag";
        let facets = vec![Facet::new(7, 11, FacetFeature::Tag { tag: "tag".into() })];
        let segs = segments(text, &facets);
        assert_eq!(segs[0].text, "héllo ");
        assert_eq!(segs[1].text, "#tag");
    }

    #[test]
    fn test_unknown_feature_is_plain_and_merged() {
        let text = "bold words here";
        let facets = vec![Facet {
            index: ByteSlice::new(0, 4),
            features: vec![FacetFeature::Unknown],
        }];
        let segs = segments(text, &facets);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].text, text);
        assert_eq!(segs[0].kind, SegmentKind::Plain);
    }

    #[test]
    fn test_first_known_feature_wins() {
        let text = "link";
        let facets = vec![Facet {
            index: ByteSlice::new(0, 4),
            features: vec![
                FacetFeature::Unknown,
                FacetFeature::Link { uri: "https://a.example".into() },
                FacetFeature::Tag { tag: "x".into() },
            ],
        }];
        let segs = segments(text, &facets);
        assert_eq!(segs[0].kind, SegmentKind::Link { uri: "https://a.example" });
    }

    #[test]
    fn test_end_past_text_is_clamped() {
        let text = "go #far";
        let facets = vec![Facet::new(3, 100, FacetFeature::Tag { tag: "far".into() })];
        let segs = segments(text, &facets);
        assert_eq!(joined(&segs), text);
        assert_eq!(segs[1].text, "#far");
    }

    #[test]
    fn test_invalid_ranges_are_ignored() {
        let text = "héllo world";
        let facets = vec![
            // start inside the two-byte 'é'
            Facet::new(2, 5, FacetFeature::Tag { tag: "bad".into() }),
            // empty
            Facet::new(6, 6, FacetFeature::Tag { tag: "empty".into() }),
            // start beyond the text
            Facet::new(50, 60, FacetFeature::Tag { tag: "gone".into() }),
        ];
        let segs = segments(text, &facets);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].text, text);
    }

    #[test]
    fn test_overlapping_facet_is_skipped() {
        let text = "abcdefgh";
        let facets = vec![
            Facet::new(0, 5, FacetFeature::Link { uri: "https://x.example".into() }),
            Facet::new(3, 8, FacetFeature::Tag { tag: "overlap".into() }),
        ];
        let segs = segments(text, &facets);
        assert_eq!(joined(&segs), text);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].text, "abcde");
        assert_eq!(segs[1].kind, SegmentKind::Plain);
    }

    #[test]
    fn test_adjacent_facets() {
        let text = "#a#b";
        let facets = vec![
            Facet::new(0, 2, FacetFeature::Tag { tag: "a".into() }),
            Facet::new(2, 4, FacetFeature::Tag { tag: "b".into() }),
        ];
        let segs = segments(text, &facets);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[1].kind, SegmentKind::Tag { tag: "b" });
    }
}
