use serde::Serialize;

/// A named prompt preset. Read-only reference data.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Style {
    pub id: &'static str,
    pub name: &'static str,
    pub prompt_modifier: &'static str,
    pub requires_two_photos: bool,
    pub is_active: bool,
    pub sort_order: i32,
}

impl Style {
    /// Number of input photos this style expects.
    pub fn photo_count(&self) -> usize {
        if self.requires_two_photos {
            2
        } else {
            1
        }
    }
}

/// Built-in catalog served when no external catalog is reachable.
pub static FALLBACK_STYLES: &[Style] = &[
    Style {
        id: "vesikalik",
        name: "Vesikalık",
        prompt_modifier: "A centered portrait against a solid blue background with a gentle gradient, \
            slightly darker at the bottom and lighter at the top. Neutral, formal expression looking \
            directly at the camera. Bright, soft, evenly distributed lighting like an ID or passport \
            photo. Shoulders visible, head fully centered, no dramatic shadows, no artistic effects. \
            Simple, clean, official studio portrait style.",
        requires_two_photos: false,
        is_active: true,
        sort_order: 1,
    },
    Style {
        id: "bulut",
        name: "Bulut",
        prompt_modifier: "A collage of six different images of the same person set against a bright \
            blue sky with scattered white clouds, smiling in most shots. The largest image, bottom \
            right, is a chest-up close-up laughing heartily. Three smaller full-body images across the \
            bottom show the person seated outdoors: upright and smiling, doubled over in laughter \
            covering the face, and smiling with a reserved posture. Two medium headshots sit faded in \
            the top corners. The cloudscape replaces the real setting for a dreamlike composition \
            focused on the person's laughter.",
        requires_two_photos: false,
        is_active: true,
        sort_order: 2,
    },
    Style {
        id: "gryffindor",
        name: "Gryffindor",
        prompt_modifier: "A full-body indoor photo of the person standing centered in front of a large \
            red and gold banner with a lion crest and the word \"GRYFFINDOR\" in an arc above it. \
            Upright posture, hands clasped at waist level, looking at the camera with a slight friendly \
            smile. Light gray wall and floor, even but slightly washed out lighting with a somewhat \
            vintage, low-quality snapshot look.",
        requires_two_photos: false,
        is_active: true,
        sort_order: 3,
    },
    Style {
        id: "osmanli",
        name: "Osmanlı",
        prompt_modifier: "2D Ottoman miniature illustration style. Highly detailed and ornate with \
            vibrant, symbolic color use. Flat perspective with no realistic shadows. Richly patterned \
            ornamental borders with swirling stylized smoke clouds and floral arabesques. Figures in \
            graceful, symbolic poses; storytelling through pattern, symmetry and cultural iconography, \
            following the traditional logic of miniature painting.",
        requires_two_photos: false,
        is_active: true,
        sort_order: 4,
    },
    Style {
        id: "asker",
        name: "Asker",
        prompt_modifier: "A surreal, kitschy digital collage inspired by 90s Turkish military photo \
            studio posters. The person poses like a conscripted commando holding a rifle, wearing \
            camouflage pants and a blue beret with a crescent-star insignia. Red sky, dramatic flag \
            overlays, ghostly glowing eyes in the sky and over-saturated color grading, with copies of \
            the person standing around in macho poses. Absurd, emotional, nostalgic and heroic tone.",
        requires_two_photos: false,
        is_active: true,
        sort_order: 5,
    },
    Style {
        id: "devrimci",
        name: "Devrimci",
        prompt_modifier: "A powerful, iconic revolutionary portrait shot with a 40-50 mm lens. The \
            subject looks slightly up, chin raised, with a determined, stern expression. Half portrait \
            framed at shoulder level, dark military-style collared jacket, simple beret with a small \
            metal star. Neutral, slightly grainy background; dramatic black and white film look with \
            strong shadows and an iconographic poster aesthetic.",
        requires_two_photos: false,
        is_active: true,
        sort_order: 6,
    },
    Style {
        id: "anime",
        name: "Anime",
        prompt_modifier: "anime style, cel shaded, vibrant, japanese animation, studio ghibli inspired, \
            detailed line work",
        requires_two_photos: false,
        is_active: true,
        sort_order: 7,
    },
    Style {
        id: "arabesk",
        name: "Arabesk",
        prompt_modifier: "A hyper-kitsch 90s Turkish arabesk album cover, extremely dramatic and over \
            the top. The person has a sorrowful, tearful expression, eyebrows raised, gazing far off to \
            the right, posed against an airbrushed neon blue to purple gradient. Giant yellow block \
            letters with a thick red outline for the album title at the bottom and a retro fake music \
            label logo in the upper left corner. VHS-era glamour.",
        requires_two_photos: false,
        is_active: true,
        sort_order: 8,
    },
    Style {
        id: "tattoo",
        name: "Dövme",
        prompt_modifier: "A photorealistic image of the person with the upper arm clearly visible and \
            the upper body in full view. A realistic tattoo on the arm made of thin, vein-like branching \
            lines, naturally inked into the skin, integrating a short, dramatic and silly Turkish quote. \
            No glow, no fantasy effects, no surreal colors, no exaggerated lighting.",
        requires_two_photos: false,
        is_active: true,
        sort_order: 9,
    },
    Style {
        id: "cift",
        name: "Çift Portresi",
        prompt_modifier: "A warm studio portrait of the two people from the two input photos standing \
            side by side, shoulders slightly touching, both looking at the camera with relaxed smiles. \
            Keep each person's face, hair and skin tone exactly as in their own photo. Soft beige \
            backdrop, gentle key light from the left, natural colors, waist-up framing with both \
            subjects equally sharp.",
        requires_two_photos: true,
        is_active: true,
        sort_order: 10,
    },
];

/// Active styles ordered for display.
pub fn active_styles() -> Vec<&'static Style> {
    let mut styles: Vec<_> = FALLBACK_STYLES.iter().filter(|s| s.is_active).collect();
    styles.sort_by_key(|s| s.sort_order);
    styles
}

/// Look up an active style by id.
pub fn find_style(id: &str) -> Option<&'static Style> {
    FALLBACK_STYLES.iter().find(|s| s.is_active && s.id == id)
}
