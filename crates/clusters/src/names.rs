/// Curated names for labels 0..=35.
pub const CLUSTER_NAMES: [&str; 36] = [
    "AI & Automation",
    "Healthcare Tech",
    "Sustainability",
    "Financial Tech",
    "Social Dynamics",
    "Smart Cities",
    "Energy Systems",
    "Digital Transformation",
    "Education Innovation",
    "Manufacturing 4.0",
    "Space & Defense",
    "Food & Agriculture",
    "Materials Science",
    "Quantum Computing",
    "Biotechnology",
    "Cybersecurity",
    "Transportation",
    "Climate Action",
    "Governance",
    "Future of Work",
    "Consumer Tech",
    "Media Evolution",
    "Supply Chain",
    "Data Economy",
    "Health & Wellness",
    "Urban Development",
    "Resource Management",
    "Scientific Research",
    "Risk & Resilience",
    "Human Enhancement",
    "Digital Society",
    "Environmental Tech",
    "Infrastructure",
    "Global Systems",
    "Emerging Markets",
    "Innovation Ecosystems",
];

pub fn cluster_name(label: i64) -> String {
    usize::try_from(label)
        .ok()
        .and_then(|i| CLUSTER_NAMES.get(i))
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("Cluster {label}"))
}
