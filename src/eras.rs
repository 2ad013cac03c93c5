//! Static era catalog.

use serde::Serialize;

/// A preset destination: display text plus the generation instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Era {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub prompt: &'static str,
    pub preview_url: &'static str,
}

pub const ERAS: &[Era] = &[
    Era {
        id: "victorian",
        name: "Victorian London",
        description: "Steampunks, top hats, and foggy streets.",
        prompt: "Transform this person into a Victorian aristocrat in 1890s London. Wear elegant period clothing, top hat or bonnet, foggy cobblestone street background, sepia tone, photorealistic, keep facial identity.",
        preview_url: "https://picsum.photos/id/1060/400/300",
    },
    Era {
        id: "cyberpunk",
        name: "Neo Tokyo 3000",
        description: "Neon lights, cybernetics, and rain.",
        prompt: "Transform this person into a cyberpunk character in Neo Tokyo year 3000. Glowing neon accents, futuristic techwear, rainy neon city background, cinematic lighting, photorealistic, keep facial identity.",
        preview_url: "https://picsum.photos/id/1067/400/300",
    },
    Era {
        id: "egypt",
        name: "Ancient Egypt",
        description: "Pharaohs, pyramids, and golden sands.",
        prompt: "Transform this person into an Ancient Egyptian noble. Gold jewelry, linen robes, desert and pyramids background, warm sunlight, photorealistic, keep facial identity.",
        preview_url: "https://picsum.photos/id/1040/400/300",
    },
    Era {
        id: "wildwest",
        name: "Wild West",
        description: "Cowboys, saloons, and dusty trails.",
        prompt: "Transform this person into a Wild West outlaw or sheriff. Cowboy hat, leather vest, dusty saloon background, rugged style, photorealistic, keep facial identity.",
        preview_url: "https://picsum.photos/id/1043/400/300",
    },
    Era {
        id: "roaring20s",
        name: "Roaring 20s",
        description: "Jazz, flappers, and art deco.",
        prompt: "Transform this person into a 1920s jazz age icon. Art deco style, flapper dress or tuxedo, Gatsby party background, black and white or vintage color, photorealistic, keep facial identity.",
        preview_url: "https://picsum.photos/id/1011/400/300",
    },
    Era {
        id: "medieval",
        name: "Medieval Knight",
        description: "Castles, armor, and epic quests.",
        prompt: "Transform this person into a Medieval knight or royal. Shining armor or velvet robes, stone castle background, dramatic lighting, photorealistic, keep facial identity.",
        preview_url: "https://picsum.photos/id/1036/400/300",
    },
];

/// Look up an era by id, ignoring case.
pub fn find(id: &str) -> Option<&'static Era> {
    let id = id.trim();
    ERAS.iter().find(|e| e.id.eq_ignore_ascii_case(id))
}

pub fn by_index(index: usize) -> Option<&'static Era> {
    ERAS.get(index)
}

/// Human-readable catalog listing for `--list-eras`.
pub fn catalog_lines() -> Vec<String> {
    ERAS.iter()
        .map(|e| format!("{:<11} {:<18} {}", e.id, e.name, e.description))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let mut ids: Vec<_> = ERAS.iter().map(|e| e.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), ERAS.len());
    }

    #[test]
    fn find_is_case_insensitive() {
        assert_eq!(find("Victorian").map(|e| e.name), Some("Victorian London"));
        assert_eq!(find(" egypt ").map(|e| e.name), Some("Ancient Egypt"));
        assert!(find("jurassic").is_none());
    }

    #[test]
    fn catalog_keeps_order() {
        assert_eq!(by_index(0).map(|e| e.id), Some("victorian"));
        assert_eq!(by_index(5).map(|e| e.id), Some("medieval"));
        assert!(by_index(6).is_none());
        assert_eq!(catalog_lines().len(), 6);
    }
}
