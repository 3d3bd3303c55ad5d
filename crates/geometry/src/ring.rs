use super::Error;
use osm::Location;

/// Role hint carried by a relation member, as mapped from its role string.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RingRole {
    Outer,
    Inner,
    Unknown,
}

impl RingRole {
    pub fn from_role(role: &str) -> Self {
        match role {
            "outer" => RingRole::Outer,
            "inner" => RingRole::Inner,
            _ => RingRole::Unknown,
        }
    }
}

/// One member way of a (multi)polygon relation: its role hint and its
/// expanded node locations.
#[derive(Debug, Clone)]
pub struct RingMember {
    pub role: RingRole,
    pub locations: Vec<Location>,
}

#[derive(Debug, Clone)]
pub struct AssembledRing {
    pub role: RingRole,
    /// Closed: first location repeated last, at least four entries.
    pub locations: Vec<Location>,
}

/// Concatenate member ways end-to-end into closed rings. Endpoint matching
/// is exact in fixed-point space. Candidates are consumed in input order,
/// lowest index first, which makes assembly deterministic.
pub fn assemble(members: &[RingMember]) -> Result<Vec<AssembledRing>, Error> {
    let segments: Vec<&RingMember> = members.iter().filter(|m| m.locations.len() >= 2).collect();
    let mut used = vec![false; segments.len()];
    let mut rings = Vec::new();

    for start in 0..segments.len() {
        if used[start] {
            continue;
        }
        used[start] = true;
        let mut ring = segments[start].locations.clone();
        let mut role = segments[start].role;

        while ring.first() != ring.last() {
            let tail = *ring.last().expect("ring is never empty");
            let next = (0..segments.len()).find(|&i| {
                !used[i]
                    && (segments[i].locations.first() == Some(&tail)
                        || segments[i].locations.last() == Some(&tail))
            });
            let Some(next) = next else {
                return Err(Error::UnclosedRing);
            };
            used[next] = true;

            let segment = &segments[next].locations;
            if segment.first() == Some(&tail) {
                ring.extend_from_slice(&segment[1..]);
            } else {
                ring.extend(segment[..segment.len() - 1].iter().rev());
            }
            if role == RingRole::Unknown {
                role = segments[next].role;
            }
        }

        if ring.len() < 4 {
            return Err(Error::TooFewPoints);
        }
        rings.push(AssembledRing {
            role,
            locations: ring,
        });
    }

    if rings.is_empty() {
        return Err(Error::NoRings);
    }
    Ok(rings)
}

#[cfg(test)]
mod test {
    use super::*;

    fn loc(lon: f64, lat: f64) -> Location {
        Location::from_degrees(lon, lat)
    }

    fn member(role: RingRole, points: &[(f64, f64)]) -> RingMember {
        RingMember {
            role,
            locations: points.iter().map(|&(lon, lat)| loc(lon, lat)).collect(),
        }
    }

    #[test]
    fn single_closed_way_is_a_ring() {
        let rings = assemble(&[member(
            RingRole::Outer,
            &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)],
        )])
        .unwrap();
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].role, RingRole::Outer);
    }

    #[test]
    fn two_open_ways_join_into_a_square() {
        // Second half runs in the same direction, so it must be reversed
        // during the join.
        let rings = assemble(&[
            member(RingRole::Unknown, &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]),
            member(RingRole::Outer, &[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0)]),
        ])
        .unwrap();
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].role, RingRole::Outer);
        let ring = &rings[0].locations;
        assert_eq!(ring.first(), ring.last());
        assert_eq!(ring.len(), 5);
    }

    #[test]
    fn outer_and_inner_rings_assemble_separately() {
        let rings = assemble(&[
            member(
                RingRole::Outer,
                &[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (0.0, 0.0)],
            ),
            member(
                RingRole::Inner,
                &[(1.0, 1.0), (2.0, 1.0), (2.0, 2.0), (1.0, 2.0), (1.0, 1.0)],
            ),
        ])
        .unwrap();
        assert_eq!(rings.len(), 2);
        assert_eq!(rings[0].role, RingRole::Outer);
        assert_eq!(rings[1].role, RingRole::Inner);
    }

    #[test]
    fn a_gap_is_an_unclosed_ring() {
        let result = assemble(&[member(
            RingRole::Outer,
            &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)],
        )]);
        assert_eq!(result.unwrap_err(), Error::UnclosedRing);
    }

    #[test]
    fn degenerate_members_are_skipped() {
        let result = assemble(&[member(RingRole::Outer, &[(0.0, 0.0)])]);
        assert_eq!(result.unwrap_err(), Error::NoRings);
    }
}
