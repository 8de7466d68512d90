//! Curated color tables
//!
//! Fixed palettes indexed by the seed hash. Order matters: changing it
//! changes which color a given seed resolves to.

use super::Rgb;

/// Curated selection of modern UI colors.
pub const PRO_COLORS: &[Rgb] = &[
    // Slate
    Rgb::new(71, 85, 105),
    Rgb::new(51, 65, 85),
    Rgb::new(30, 41, 59),
    // Zinc
    Rgb::new(82, 82, 91),
    Rgb::new(63, 63, 70),
    Rgb::new(39, 39, 42),
    // Stone
    Rgb::new(87, 83, 78),
    Rgb::new(68, 64, 60),
    Rgb::new(41, 37, 36),
    // Gray
    Rgb::new(75, 85, 99),
    Rgb::new(55, 65, 81),
    Rgb::new(31, 41, 55),
    // Red
    Rgb::new(239, 68, 68),
    Rgb::new(220, 38, 38),
    Rgb::new(185, 28, 28),
    // Rose
    Rgb::new(244, 63, 94),
    Rgb::new(225, 29, 72),
    Rgb::new(190, 18, 60),
    // Pink
    Rgb::new(236, 72, 153),
    Rgb::new(219, 39, 119),
    Rgb::new(190, 24, 93),
    // Orange
    Rgb::new(249, 115, 22),
    Rgb::new(234, 88, 12),
    Rgb::new(194, 65, 12),
    // Amber
    Rgb::new(245, 158, 11),
    Rgb::new(217, 119, 6),
    Rgb::new(180, 83, 9),
    // Yellow (dark tones)
    Rgb::new(234, 179, 8),
    Rgb::new(202, 138, 4),
    Rgb::new(161, 98, 7),
    // Green
    Rgb::new(34, 197, 94),
    Rgb::new(22, 163, 74),
    Rgb::new(21, 128, 61),
    // Emerald
    Rgb::new(16, 185, 129),
    Rgb::new(5, 150, 105),
    Rgb::new(4, 120, 87),
    // Lime
    Rgb::new(132, 204, 22),
    Rgb::new(101, 163, 13),
    Rgb::new(77, 124, 15),
    // Teal
    Rgb::new(20, 184, 166),
    Rgb::new(13, 148, 136),
    Rgb::new(15, 118, 110),
    // Cyan
    Rgb::new(6, 182, 212),
    Rgb::new(8, 145, 178),
    Rgb::new(21, 94, 117),
    // Sky
    Rgb::new(14, 165, 233),
    Rgb::new(2, 132, 199),
    Rgb::new(3, 105, 161),
    // Blue
    Rgb::new(59, 130, 246),
    Rgb::new(37, 99, 235),
    Rgb::new(29, 78, 216),
    // Indigo
    Rgb::new(99, 102, 241),
    Rgb::new(79, 70, 229),
    Rgb::new(67, 56, 202),
    // Violet
    Rgb::new(139, 92, 246),
    Rgb::new(124, 58, 237),
    Rgb::new(109, 40, 217),
    // Purple
    Rgb::new(168, 85, 247),
    Rgb::new(147, 51, 234),
    Rgb::new(126, 34, 206),
    // Fuchsia
    Rgb::new(217, 70, 239),
    Rgb::new(192, 38, 211),
    Rgb::new(162, 28, 175),
    // Accents
    Rgb::new(88, 101, 242),
    Rgb::new(29, 161, 242),
    Rgb::new(0, 0, 0),
    Rgb::new(25, 25, 25),
];

/// Hand-picked gradient endpoint pairs.
pub const PRO_GRADIENTS: &[(Rgb, Rgb)] = &[
    (Rgb::new(59, 130, 246), Rgb::new(37, 99, 235)),   // Blue -> Dark Blue
    (Rgb::new(139, 92, 246), Rgb::new(124, 58, 237)),  // Violet -> Deep Violet
    (Rgb::new(236, 72, 153), Rgb::new(219, 39, 119)),  // Pink -> Rose
    (Rgb::new(16, 185, 129), Rgb::new(5, 150, 105)),   // Emerald -> Green
    (Rgb::new(249, 115, 22), Rgb::new(234, 88, 12)),   // Orange -> Red Orange
    (Rgb::new(99, 102, 241), Rgb::new(168, 85, 247)),  // Indigo -> Purple
    (Rgb::new(6, 182, 212), Rgb::new(59, 130, 246)),   // Cyan -> Blue
    (Rgb::new(244, 63, 94), Rgb::new(249, 115, 22)),   // Rose -> Orange
    (Rgb::new(34, 197, 94), Rgb::new(20, 184, 166)),   // Green -> Teal
    (Rgb::new(71, 85, 105), Rgb::new(30, 41, 59)),     // Slate -> Dark Slate
    (Rgb::new(168, 85, 247), Rgb::new(236, 72, 153)),  // Purple -> Pink
    (Rgb::new(14, 165, 233), Rgb::new(99, 102, 241)),  // Sky -> Indigo
];

/// Brand-leaning table used by the `google` palette mode.
pub const BRAND_COLORS: &[Rgb] = &[
    Rgb::new(59, 130, 246),  // Royal Blue
    Rgb::new(37, 99, 235),   // Darker Blue
    Rgb::new(14, 165, 233),  // Sky Blue
    Rgb::new(6, 182, 212),   // Cyan
    Rgb::new(139, 92, 246),  // Violet
    Rgb::new(124, 58, 237),  // Deep Violet
    Rgb::new(192, 38, 211),  // Fuchsia
    Rgb::new(219, 39, 119),  // Pink
    Rgb::new(225, 29, 72),   // Rose
    Rgb::new(16, 185, 129),  // Emerald
    Rgb::new(5, 150, 105),   // Forest Green
    Rgb::new(20, 184, 166),  // Teal
    Rgb::new(13, 148, 136),  // Dark Teal
    Rgb::new(249, 115, 22),  // Orange
    Rgb::new(234, 88, 12),   // Burnt Orange
    Rgb::new(245, 158, 11),  // Amber
    Rgb::new(220, 38, 38),   // Red
    Rgb::new(71, 85, 105),   // Slate
    Rgb::new(82, 82, 91),    // Zinc
    Rgb::new(79, 70, 229),   // Indigo
];
