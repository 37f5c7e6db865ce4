//! Heuristic two-level minimization: EXPAND against the off-set, IRREDUNDANT,
//! then REDUCE and repeat while the cover gets cheaper.

use crate::synth::sop::{Cube, Lit, Sop, is_negated, var_of};
use std::cmp::Reverse;
use tracing::trace;

///
/// Policy
/// Context hooks steering which literals EXPAND may drop and REDUCE may add.
///

pub(crate) trait Policy {
    fn can_raise(&self, _cube: &Cube, _lit: Lit) -> bool {
        true
    }

    fn can_lower(&self, _cube: &Cube, _lit: Lit) -> bool {
        true
    }

    /// Order in which EXPAND tries to drop literals; literals late in the
    /// order are the ones most likely to survive.
    fn raise_order(&self, cube: &Cube) -> Vec<Lit> {
        let mut lits = cube.lits().to_vec();
        lits.sort_by_key(|l| (Reverse(is_negated(*l)), Reverse(var_of(*l))));

        lits
    }
}

// (cubes, literals); lexicographic.
fn cost(cover: &Sop) -> (usize, usize) {
    (cover.cubes().len(), cover.literal_count())
}

/// Minimized cover `F` with `on \ dc ⊆ F ⊆ on ∪ dc`.
pub(crate) fn minimize(on: &Sop, dc: &Sop, policy: &dyn Policy) -> Sop {
    if on.is_empty() || on.is_universe() {
        return on.clone();
    }
    let off = on.or(dc).complement();
    if off.is_empty() {
        return Sop::universe();
    }

    let mut cover = irredundant(&expand(on, &off, policy), dc);
    let mut best = cost(&cover);
    trace!(cubes = best.0, literals = best.1, "espresso: initial cover");

    loop {
        let reduced = reduce(&cover, dc, policy);
        let candidate = irredundant(&expand(&reduced, &off, policy), dc);
        let next = cost(&candidate);
        if next >= best {
            break;
        }
        trace!(cubes = next.0, literals = next.1, "espresso: improved cover");
        cover = candidate;
        best = next;
    }

    cover
}

fn expand(cover: &Sop, off: &Sop, policy: &dyn Policy) -> Sop {
    let mut pending: Vec<Cube> = cover.cubes().to_vec();
    // largest cubes first; they absorb the most
    pending.sort_by_key(Cube::len);

    let mut out: Vec<Cube> = Vec::with_capacity(pending.len());
    for cube in pending {
        if out.iter().any(|done| done.contains(&cube)) {
            continue;
        }
        let mut current = cube;
        for l in policy.raise_order(&current) {
            if !current.has(l) || !policy.can_raise(&current, l) {
                continue;
            }
            let raised = current.without(l);
            if !off.cubes().iter().any(|o| o.intersects(&raised)) {
                current = raised;
            }
        }
        out.push(current);
    }

    Sop::from_cubes(out)
}

fn irredundant(cover: &Sop, dc: &Sop) -> Sop {
    let mut cubes: Vec<Cube> = cover.cubes().to_vec();
    // try to drop the most specific cubes first
    cubes.sort_by_key(|c| Reverse(c.len()));

    let mut i = 0;
    while i < cubes.len() {
        let others = Sop::from_cubes(
            cubes
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, c)| c.clone()),
        )
        .or(dc);
        if others.covers_cube(&cubes[i]) {
            cubes.remove(i);
        } else {
            i += 1;
        }
    }

    Sop::from_cubes(cubes)
}

// Shrink each cube to the supercube of the points only it covers.
fn reduce(cover: &Sop, dc: &Sop, policy: &dyn Policy) -> Sop {
    let mut cubes: Vec<Cube> = cover.cubes().to_vec();

    let mut i = 0;
    while i < cubes.len() {
        let others = Sop::from_cubes(
            cubes
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, c)| c.clone()),
        )
        .or(dc);
        let uncovered = others.restrict(&cubes[i]).complement();
        let Some(super_cube) = uncovered.supercube() else {
            cubes.remove(i);
            continue;
        };

        let mut reduced = cubes[i].clone();
        for l in super_cube.lits() {
            if !reduced.has(*l)
                && policy.can_lower(&reduced, *l)
                && let Some(next) = reduced.with(*l)
            {
                reduced = next;
            }
        }
        cubes[i] = reduced;
        i += 1;
    }

    Sop::from_cubes(cubes)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::sop::lit;

    struct Plain;

    impl Policy for Plain {}

    fn cube(lits: &[(u32, bool)]) -> Cube {
        Cube::from_lits(lits.iter().map(|(v, n)| lit(*v, *n))).expect("fixture cube is consistent")
    }

    #[test]
    fn adjacent_minterms_merge() {
        let on = Sop::from_cubes([
            cube(&[(0, false), (1, false)]),
            cube(&[(0, false), (1, true)]),
        ]);

        assert_eq!(minimize(&on, &Sop::empty(), &Plain), Sop::from_cubes([cube(&[(0, false)])]));
    }

    #[test]
    fn dont_cares_allow_larger_cubes() {
        let on = Sop::from_cubes([cube(&[(0, false), (1, false)])]);
        let dc = Sop::from_cubes([cube(&[(0, false), (1, true)])]);

        assert_eq!(minimize(&on, &dc, &Plain), Sop::from_cubes([cube(&[(0, false)])]));
    }

    #[test]
    fn consensus_cube_is_removed() {
        // x·y + ¬x·z + y·z
        let on = Sop::from_cubes([
            cube(&[(0, false), (1, false)]),
            cube(&[(0, true), (2, false)]),
            cube(&[(1, false), (2, false)]),
        ]);
        let out = minimize(&on, &Sop::empty(), &Plain);

        assert_eq!(out.cubes().len(), 2);
        assert!(out.covers(&on) && on.covers(&out));
    }

    #[test]
    fn policy_can_pin_a_literal() {
        struct KeepVarOne;
        impl Policy for KeepVarOne {
            fn can_raise(&self, _cube: &Cube, l: Lit) -> bool {
                var_of(l) != 1
            }
        }

        let on = Sop::from_cubes([cube(&[(0, false), (1, true)])]);
        let dc = Sop::from_cubes([cube(&[(0, false), (1, false)])]);

        assert_eq!(minimize(&on, &dc, &KeepVarOne), on);
    }
}
