//! OEM supersession chains: discontinued numbers replaced by their current
//! successor. Chains are followed to the end with a hop guard.

const SUPERSESSIONS: &[(&str, &str)] = &[
    ("5Q0615301A", "5Q0615301D"),
    ("5Q0615301D", "5Q0615301F"),
    ("1K0615301AB", "1K0615301AA"),
    ("A0004212412", "A0004212512"),
    ("11427508969", "11428507683"),
];

const MAX_HOPS: usize = 5;

/// Follow the supersession chain from `oem`. Returns the current successor
/// and the hop count, or None when the number was never superseded.
pub fn supersede(oem: &str) -> Option<(String, usize)> {
    let normalize = crate::consensus::normalize_oem;
    let mut current = normalize(oem);
    let mut hops = 0;
    while hops < MAX_HOPS {
        let next = SUPERSESSIONS
            .iter()
            .find(|(old, _)| normalize(old) == current)
            .map(|(_, new)| new);
        match next {
            Some(new) => {
                current = normalize(new);
                hops += 1;
            }
            None => break,
        }
    }
    if hops == 0 {
        None
    } else {
        Some((current, hops))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_followed_to_the_end() {
        let (current, hops) = supersede("5Q0615301A").expect("superseded");
        assert_eq!(current, "5Q0615301F");
        assert_eq!(hops, 2);
    }

    #[test]
    fn test_current_number_is_untouched() {
        assert!(supersede("5Q0615301F").is_none());
    }
}
