/// Typical screen widths used to bucket resolutions. First match from the
/// top wins; anything below 415px is "XS".
const SCREEN_CLASSES: [(u16, &str); 9] = [
    (5120, "UHD 5K"),
    (3840, "UHD 4K"),
    (2560, "WQHD"),
    (1920, "Full HD"),
    (1280, "HD"),
    (1024, "XL"),
    (800, "L"),
    (600, "M"),
    (415, "S"),
];

/// Bucket a screen width in pixels. Unknown width (0) yields `""`.
pub fn screen_class(width: u16) -> &'static str {
    if width == 0 {
        return "";
    }

    for (min_width, class) in SCREEN_CLASSES {
        if width >= min_width {
            return class;
        }
    }

    "XS"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_known_widths() {
        assert_eq!(screen_class(0), "");
        assert_eq!(screen_class(100), "XS");
        assert_eq!(screen_class(414), "XS");
        assert_eq!(screen_class(415), "S");
        assert_eq!(screen_class(600), "M");
        assert_eq!(screen_class(800), "L");
        assert_eq!(screen_class(1024), "XL");
        assert_eq!(screen_class(1280), "HD");
        assert_eq!(screen_class(1920), "Full HD");
        assert_eq!(screen_class(2560), "WQHD");
        assert_eq!(screen_class(3840), "UHD 4K");
        assert_eq!(screen_class(5120), "UHD 5K");
        assert_eq!(screen_class(u16::MAX), "UHD 5K");
    }

    #[test]
    fn classification_is_monotone() {
        let rank = |class: &str| {
            SCREEN_CLASSES
                .iter()
                .position(|(_, name)| *name == class)
                .map(|position| SCREEN_CLASSES.len() - position)
                .unwrap_or(0)
        };

        let mut previous = 0;

        for width in 1..=6000u16 {
            let current = rank(screen_class(width));
            assert!(current >= previous, "rank dropped at width {width}");
            previous = current;
        }
    }
}
