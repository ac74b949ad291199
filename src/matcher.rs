use facegate_vision::Embedding;

use crate::storage::EnrollmentRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct Match<'a> {
    pub index: usize,
    pub name: &'a str,
    pub distance: f32,
}

/// First record, in insertion order, within `threshold` of `probe`.
///
/// Later records are never consulted once one matches, even if they are
/// closer.
pub fn first_match<'a>(
    records: &'a [EnrollmentRecord],
    probe: &Embedding,
    threshold: f32,
) -> Option<Match<'a>> {
    records.iter().enumerate().find_map(|(index, record)| {
        let distance = record.embedding.distance(probe);
        log::debug!("distance to {}: {:.4}", record.name, distance);
        (distance <= threshold).then_some(Match {
            index,
            name: &record.name,
            distance,
        })
    })
}
