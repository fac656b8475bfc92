#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightBand {
    pub grade_label: &'static str,
    pub weight: f64,
    pub score_min: i32,
    pub score_max: i32,
}

/// Grade bands in descending score order.
pub static BANDS: [WeightBand; 7] = [
    WeightBand {
        grade_label: "AA",
        weight: 4.00,
        score_min: 95,
        score_max: 100,
    },
    WeightBand {
        grade_label: "A",
        weight: 3.80,
        score_min: 85,
        score_max: 94,
    },
    WeightBand {
        grade_label: "BB",
        weight: 3.50,
        score_min: 80,
        score_max: 84,
    },
    WeightBand {
        grade_label: "B",
        weight: 3.20,
        score_min: 70,
        score_max: 79,
    },
    WeightBand {
        grade_label: "CC",
        weight: 2.80,
        score_min: 65,
        score_max: 69,
    },
    WeightBand {
        grade_label: "C",
        weight: 2.50,
        score_min: 40,
        score_max: 64,
    },
    WeightBand {
        grade_label: "E",
        weight: 2.00,
        score_min: 0,
        score_max: 39,
    },
];

static LOWEST: &WeightBand = &BANDS[BANDS.len() - 1];

/// Fractional scores between two integer edges (e.g. 94.5) stay in the lower
/// band until they reach the next band's `score_min`.
pub fn lookup(score: f64) -> &'static WeightBand {
    if !(0.0..=100.0).contains(&score) {
        return LOWEST;
    }

    BANDS
        .iter()
        .find(|band| score >= f64::from(band.score_min))
        .unwrap_or(LOWEST)
}
