//! Two-level boolean algebra over encoded literals.
//!
//! A literal is `var << 1 | negated`; a cube is a sorted conjunction of
//! literals over distinct variables; a sum of products (SOP) is a disjunction
//! of cubes with no cube contained in another.

use std::collections::BTreeMap;

pub(crate) type Lit = u32;

#[must_use]
pub(crate) const fn lit(var: u32, negated: bool) -> Lit {
    (var << 1) | negated as u32
}

#[must_use]
pub(crate) const fn var_of(l: Lit) -> u32 {
    l >> 1
}

#[must_use]
pub(crate) const fn is_negated(l: Lit) -> bool {
    l & 1 == 1
}

#[must_use]
pub(crate) const fn complement_lit(l: Lit) -> Lit {
    l ^ 1
}

///
/// Cube
///

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct Cube(Vec<Lit>);

impl Cube {
    /// The cube with no literals (always true).
    pub(crate) const fn universe() -> Self {
        Self(Vec::new())
    }

    /// Conjunction of `lits`; `None` when two of them conflict.
    pub(crate) fn from_lits(lits: impl IntoIterator<Item = Lit>) -> Option<Self> {
        let mut lits: Vec<Lit> = lits.into_iter().collect();
        lits.sort_unstable();
        lits.dedup();
        if lits.windows(2).any(|w| var_of(w[0]) == var_of(w[1])) {
            return None;
        }

        Some(Self(lits))
    }

    pub(crate) fn lits(&self) -> &[Lit] {
        &self.0
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn is_universe(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn has(&self, l: Lit) -> bool {
        self.0.binary_search(&l).is_ok()
    }

    pub(crate) fn and(&self, other: &Self) -> Option<Self> {
        Self::from_lits(self.0.iter().chain(&other.0).copied())
    }

    pub(crate) fn intersects(&self, other: &Self) -> bool {
        !self.0.iter().any(|l| other.has(complement_lit(*l)))
    }

    /// Every point of `other` lies in `self`.
    pub(crate) fn contains(&self, other: &Self) -> bool {
        self.0.iter().all(|l| other.has(*l))
    }

    pub(crate) fn without(&self, l: Lit) -> Self {
        Self(self.0.iter().copied().filter(|x| *x != l).collect())
    }

    pub(crate) fn with(&self, l: Lit) -> Option<Self> {
        Self::from_lits(self.0.iter().copied().chain(std::iter::once(l)))
    }
}

///
/// Sop
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct Sop(Vec<Cube>);

impl Sop {
    pub(crate) const fn empty() -> Self {
        Self(Vec::new())
    }

    pub(crate) fn universe() -> Self {
        Self(vec![Cube::universe()])
    }

    pub(crate) fn from_lit(l: Lit) -> Self {
        Self(vec![Cube(vec![l])])
    }

    pub(crate) fn from_cubes(cubes: impl IntoIterator<Item = Cube>) -> Self {
        let mut sop = Self(cubes.into_iter().collect());
        sop.absorb();

        sop
    }

    pub(crate) fn cubes(&self) -> &[Cube] {
        &self.0
    }

    pub(crate) fn into_cubes(self) -> Vec<Cube> {
        self.0
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn is_universe(&self) -> bool {
        self.0.iter().any(Cube::is_universe)
    }

    pub(crate) fn literal_count(&self) -> usize {
        self.0.iter().map(Cube::len).sum()
    }

    // Drop duplicate cubes and cubes contained in another cube.
    fn absorb(&mut self) {
        self.0.sort_by_key(Cube::len);
        self.0.dedup();
        let mut kept: Vec<Cube> = Vec::with_capacity(self.0.len());
        for cube in self.0.drain(..) {
            if !kept.iter().any(|k| k.contains(&cube)) {
                kept.push(cube);
            }
        }
        kept.sort();
        self.0 = kept;
    }

    pub(crate) fn or(&self, other: &Self) -> Self {
        Self::from_cubes(self.0.iter().chain(&other.0).cloned())
    }

    pub(crate) fn and(&self, other: &Self) -> Self {
        let mut cubes = Vec::with_capacity(self.0.len() * other.0.len());
        for a in &self.0 {
            for b in &other.0 {
                if let Some(c) = a.and(b) {
                    cubes.push(c);
                }
            }
        }

        Self::from_cubes(cubes)
    }

    /// Restriction of the function to the half-space where `l` holds.
    pub(crate) fn cofactor(&self, l: Lit) -> Self {
        let opposite = complement_lit(l);
        Self::from_cubes(
            self.0
                .iter()
                .filter(|c| !c.has(opposite))
                .map(|c| c.without(l)),
        )
    }

    /// Restriction to the sub-space described by `cube`.
    pub(crate) fn restrict(&self, cube: &Cube) -> Self {
        Self::from_cubes(
            self.0
                .iter()
                .filter(|c| c.intersects(cube))
                .map(|c| Cube(c.0.iter().copied().filter(|l| !cube.has(*l)).collect())),
        )
    }

    // Occurrence counts per variable: (positive, negative).
    fn occurrences(&self) -> BTreeMap<u32, (usize, usize)> {
        let mut counts: BTreeMap<u32, (usize, usize)> = BTreeMap::new();
        for cube in &self.0 {
            for l in cube.lits() {
                let entry = counts.entry(var_of(*l)).or_default();
                if is_negated(*l) {
                    entry.1 += 1;
                } else {
                    entry.0 += 1;
                }
            }
        }

        counts
    }

    // Most frequent variable, preferring binate ones.
    fn split_var(&self, binate_only: bool) -> Option<u32> {
        self.occurrences()
            .into_iter()
            .filter(|(_, (p, n))| !binate_only || (*p > 0 && *n > 0))
            .max_by_key(|(var, (p, n))| (*p > 0 && *n > 0, p + n, std::cmp::Reverse(*var)))
            .map(|(var, _)| var)
    }

    pub(crate) fn complement(&self) -> Self {
        if self.0.is_empty() {
            return Self::universe();
        }
        if self.is_universe() {
            return Self::empty();
        }
        if let [cube] = self.0.as_slice() {
            // De Morgan, as disjoint cubes
            let mut cubes = Vec::with_capacity(cube.len());
            let mut prefix: Vec<Lit> = Vec::with_capacity(cube.len());
            for l in cube.lits() {
                let mut lits = prefix.clone();
                lits.push(complement_lit(*l));
                cubes.push(Cube(lits));
                prefix.push(*l);
            }
            return Self::from_cubes(cubes.into_iter().map(|mut c| {
                c.0.sort_unstable();
                c
            }));
        }

        let Some(var) = self.split_var(false) else {
            return Self::empty();
        };
        let pos = lit(var, false);
        let neg = lit(var, true);
        let high = self.cofactor(pos).complement();
        let low = self.cofactor(neg).complement();

        let mut cubes: Vec<Cube> = Vec::with_capacity(high.0.len() + low.0.len());
        for cube in high.0 {
            if low.0.contains(&cube) {
                cubes.push(cube);
            } else if let Some(c) = cube.with(pos) {
                cubes.push(c);
            }
        }
        for cube in low.0 {
            if !cubes.contains(&cube)
                && let Some(c) = cube.with(neg)
            {
                cubes.push(c);
            }
        }

        Self::from_cubes(cubes)
    }

    pub(crate) fn is_tautology(&self) -> bool {
        if self.is_universe() {
            return true;
        }
        if self.0.is_empty() {
            return false;
        }
        // a unate cover is a tautology only through the universal cube
        let Some(var) = self.split_var(true) else {
            return false;
        };

        self.cofactor(lit(var, false)).is_tautology() && self.cofactor(lit(var, true)).is_tautology()
    }

    /// Every point of `cube` is covered.
    pub(crate) fn covers_cube(&self, cube: &Cube) -> bool {
        self.restrict(cube).is_tautology()
    }

    /// Every point of `other` is covered.
    pub(crate) fn covers(&self, other: &Self) -> bool {
        other.0.iter().all(|c| self.covers_cube(c))
    }

    /// Smallest cube containing every cube; `None` for the empty SOP.
    pub(crate) fn supercube(&self) -> Option<Cube> {
        let (first, rest) = self.0.split_first()?;
        let lits = first
            .lits()
            .iter()
            .copied()
            .filter(|l| rest.iter().all(|c| c.has(*l)));

        Some(Cube(lits.collect()))
    }
}

///
/// TESTS
///
