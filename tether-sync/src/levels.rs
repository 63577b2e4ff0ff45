//! Level resolution for placed objects.

use tether_host::Level;

/// The level whose elevation is closest to `z`; ties keep the first.
pub fn nearest_level(levels: &[Level], z: f64) -> Option<&Level> {
    levels.iter().fold(None, |best: Option<&Level>, level| match best {
        Some(b) if (b.elevation - z).abs() <= (level.elevation - z).abs() => Some(b),
        _ => Some(level),
    })
}

/// Signed offset of `z` above `level`.
pub fn offset_from(level: &Level, z: f64) -> f64 {
    z - level.elevation
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_host::ElementId;

    fn levels() -> Vec<Level> {
        vec![
            Level {
                id: ElementId(1),
                name: "Level 1".into(),
                elevation: 0.0,
            },
            Level {
                id: ElementId(2),
                name: "Level 2".into(),
                elevation: 10.0,
            },
        ]
    }

    #[test]
    fn picks_closest_elevation() {
        let levels = levels();
        assert_eq!(nearest_level(&levels, 3.0).map(|l| l.id), Some(ElementId(1)));
        assert_eq!(nearest_level(&levels, 7.5).map(|l| l.id), Some(ElementId(2)));
        assert_eq!(nearest_level(&levels, 5.0).map(|l| l.id), Some(ElementId(1)));
        assert!(nearest_level(&[], 0.0).is_none());
    }

    #[test]
    fn offset_is_signed() {
        let levels = levels();
        assert_eq!(offset_from(&levels[1], 8.5), -1.5);
    }
}
