//! Rule header port groups.
//!
//! Grammar: `any`, a single port, open or closed ranges (`1024:`, `:1024`,
//! `1024:2048`), negation, and bracketed lists of the above. The canonical
//! form is a sorted, merged list of inclusive ranges with negation resolved,
//! shared with the bidirectional symmetry check.

/// Canonical parsed port group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortGroup {
    /// Inclusive port ranges, sorted and merged.
    pub ranges: Vec<(u16, u16)>,
    pub contains_negation: bool,
}

pub fn parse_port_group(input: &str) -> Result<PortGroup, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty port specification".into());
    }

    let mut pos = Vec::new();
    let mut neg = Vec::new();
    let mut saw_negation = false;
    parse_into(input, false, &mut pos, &mut neg, &mut saw_negation)?;

    if pos.is_empty() && !neg.is_empty() {
        pos.push((0, u16::MAX));
    }
    let mut ranges = normalize(pos);
    for cut in neg {
        ranges = ranges.into_iter().flat_map(|r| subtract(r, cut)).collect();
    }

    if ranges.is_empty() {
        return Err(format!("port group \"{input}\" matches no ports"));
    }

    Ok(PortGroup { ranges, contains_negation: saw_negation })
}

fn parse_into(
    input: &str,
    negate: bool,
    pos: &mut Vec<(u16, u16)>,
    neg: &mut Vec<(u16, u16)>,
    saw_negation: &mut bool,
) -> Result<(), String> {
    let mut s = input.trim();
    let mut negate = negate;
    while let Some(rest) = s.strip_prefix('!') {
        negate = !negate;
        *saw_negation = true;
        s = rest.trim_start();
    }
    if s.is_empty() {
        return Err("dangling negation in port specification".into());
    }

    if let Some(rest) = s.strip_prefix('[') {
        let inner = rest
            .strip_suffix(']')
            .ok_or_else(|| format!("unbalanced brackets in \"{s}\""))?;
        let mut depth = 0usize;
        let mut start = 0usize;
        for (i, c) in inner.char_indices() {
            match c {
                '[' => depth += 1,
                ']' => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| format!("unbalanced brackets in \"{inner}\""))?;
                }
                ',' if depth == 0 => {
                    parse_into(&inner[start..i], negate, pos, neg, saw_negation)?;
                    start = i + 1;
                }
                _ => {}
            }
        }
        if depth != 0 {
            return Err(format!("unbalanced brackets in \"{inner}\""));
        }
        return parse_into(&inner[start..], negate, pos, neg, saw_negation);
    }
    if s.ends_with(']') {
        return Err(format!("unbalanced brackets in \"{s}\""));
    }

    if s.eq_ignore_ascii_case("any") {
        if negate {
            return Err("negating \"any\" is not supported".into());
        }
        pos.push((0, u16::MAX));
        return Ok(());
    }

    let range = parse_range(s)?;
    if negate {
        neg.push(range);
    } else {
        pos.push(range);
    }
    Ok(())
}

fn parse_range(s: &str) -> Result<(u16, u16), String> {
    match s.split_once(':') {
        Some((lo, hi)) => {
            let lo = lo.trim();
            let hi = hi.trim();
            let lo = if lo.is_empty() { 0 } else { parse_port(lo)? };
            let hi = if hi.is_empty() { u16::MAX } else { parse_port(hi)? };
            if lo > hi {
                return Err(format!("inverted port range \"{s}\""));
            }
            Ok((lo, hi))
        }
        None => {
            let p = parse_port(s)?;
            Ok((p, p))
        }
    }
}

fn parse_port(s: &str) -> Result<u16, String> {
    s.parse::<u16>()
        .map_err(|_| format!("invalid port \"{s}\""))
}

fn normalize(mut ranges: Vec<(u16, u16)>) -> Vec<(u16, u16)> {
    ranges.sort_unstable();
    let mut out: Vec<(u16, u16)> = Vec::with_capacity(ranges.len());
    for (lo, hi) in ranges {
        match out.last_mut() {
            Some(last) if u32::from(lo) <= u32::from(last.1) + 1 => last.1 = last.1.max(hi),
            _ => out.push((lo, hi)),
        }
    }
    out
}

fn subtract(range: (u16, u16), cut: (u16, u16)) -> Vec<(u16, u16)> {
    let (lo, hi) = range;
    let (clo, chi) = cut;
    if chi < lo || clo > hi {
        return vec![range];
    }
    let mut out = Vec::new();
    if clo > lo {
        out.push((lo, clo - 1));
    }
    if chi < hi {
        out.push((chi + 1, hi));
    }
    out
}

impl PortGroup {
    pub fn same_coverage(&self, other: &PortGroup) -> bool {
        self.ranges == other.ranges
    }
}
