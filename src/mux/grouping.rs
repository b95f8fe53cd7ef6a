use indexmap::IndexMap;
use itertools::Itertools as _;

use crate::quant::{ChannelId, Frequency};

/// Widening applied to the search bounds so that exact gaps are included.
fn margin() -> Frequency {
    Frequency::from_hz(1.0).expect("Margin should not be NaN")
}

/// Greedy clustering of channels sorted by frequency.
///
/// A channel joins the current group while its distance to the group's first
/// member is at most `width`. Returns the groups and the largest distance
/// accepted into any group.
fn group_by_width<'a>(
    sorted: &[(&'a ChannelId, Frequency)],
    width: Frequency,
) -> (Vec<Vec<&'a ChannelId>>, Frequency) {
    let mut groups: Vec<Vec<&ChannelId>> = Vec::new();
    let mut head = Frequency::ZERO;
    let mut largest = Frequency::ZERO;
    for &(channel, frequency) in sorted {
        match groups.last_mut() {
            Some(group) if frequency - head <= width => {
                largest = largest.max(frequency - head);
                group.push(channel);
            }
            _ => {
                head = frequency;
                groups.push(vec![channel]);
            }
        }
    }
    (groups, largest)
}

/// Assigns every channel a lane index below `lanes`.
///
/// With no more channels than lanes each channel gets its own lane in input
/// order. Otherwise the clustering width is bisected down to `accuracy` and
/// the clusters of the final upper bound become the lanes, lowest
/// frequencies first.
pub fn assign_lanes(
    targets: &IndexMap<ChannelId, Frequency>,
    accuracy: Frequency,
    lanes: usize,
) -> IndexMap<ChannelId, usize> {
    if targets.len() <= lanes {
        return targets
            .keys()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
    }
    let sorted = targets
        .iter()
        .map(|(c, &f)| (c, f))
        .sorted_by_key(|&(_, f)| f)
        .collect_vec();
    let (Some(&(_, lowest)), Some(&(_, highest))) = (sorted.first(), sorted.last()) else {
        return IndexMap::new();
    };
    let accuracy = accuracy.max(margin() * 4.0);
    let mut low = margin();
    let mut high = highest - lowest + margin();
    while high - low > accuracy {
        let mid = (high + low) / 2.0;
        let (groups, largest) = group_by_width(&sorted, mid);
        if groups.len() > lanes {
            low = mid;
        } else {
            high = largest + margin();
        }
    }
    let (groups, _) = group_by_width(&sorted, high);
    groups
        .into_iter()
        .enumerate()
        .flat_map(|(i, group)| group.into_iter().map(move |c| (c.clone(), i)))
        .collect()
}
