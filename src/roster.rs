use crate::api::Student;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Roster ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Alphabetical by last name
    #[default]
    Nom,
    /// Highest points first
    Points,
    /// Alphabetical by level
    Niveau,
    /// Most recent activity first
    LastActivity,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nom" | "name" => Ok(SortKey::Nom),
            "points" => Ok(SortKey::Points),
            "niveau" | "level" => Ok(SortKey::Niveau),
            "last_activity" | "lastactivity" | "activity" => Ok(SortKey::LastActivity),
            other => Err(format!(
                "unknown sort key '{}' (expected nom, points, niveau or last_activity)",
                other
            )),
        }
    }
}

/// Badge shown next to a student's points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Standing {
    Excellent,
    Bon,
    Moyen,
    Attention,
    Critique,
}

impl Standing {
    pub fn from_points(points: i64) -> Self {
        match points {
            p if p >= 20 => Standing::Excellent,
            p if p >= 10 => Standing::Bon,
            p if p >= 0 => Standing::Moyen,
            p if p >= -5 => Standing::Attention,
            _ => Standing::Critique,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Standing::Excellent => "Excellent",
            Standing::Bon => "Bon",
            Standing::Moyen => "Moyen",
            Standing::Attention => "Attention",
            Standing::Critique => "Critique",
        }
    }
}

impl fmt::Display for Standing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Search, filters and ordering for the consultation view.
///
/// `None` filters mean "all"; the literal `"all"` is accepted too.
#[derive(Debug, Clone, Default)]
pub struct RosterQuery {
    pub search: Option<String>,
    pub niveau: Option<String>,
    pub status: Option<String>,
    pub sort: SortKey,
}

fn filter_value(filter: &Option<String>) -> Option<&str> {
    filter
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

impl RosterQuery {
    pub fn matches(&self, student: &Student) -> bool {
        let matches_search = match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(term) => {
                student.nom.to_lowercase().contains(&term.to_lowercase())
                    || student.id.to_string().contains(term)
            }
        };

        let matches_niveau = filter_value(&self.niveau).map_or(true, |n| student.niveau == n);
        let matches_status = filter_value(&self.status).map_or(true, |s| student.status == s);

        matches_search && matches_niveau && matches_status
    }

    /// Filter then sort, keeping server order among equal keys
    pub fn apply<'a>(&self, students: &'a [Student]) -> Vec<&'a Student> {
        let mut selected: Vec<&Student> = students.iter().filter(|s| self.matches(s)).collect();
        selected.sort_by(|a, b| self.compare(a, b));
        selected
    }

    fn compare(&self, a: &Student, b: &Student) -> Ordering {
        match self.sort {
            SortKey::Nom => compare_names(&a.nom, &b.nom),
            SortKey::Points => b.points.cmp(&a.points),
            SortKey::Niveau => compare_names(&a.niveau, &b.niveau),
            SortKey::LastActivity => {
                let at = |s: &Student| s.last_activity.as_ref().and_then(|l| l.to_datetime());
                // unknown activity sorts last
                match (at(a), at(b)) {
                    (Some(x), Some(y)) => y.cmp(&x),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
            }
        }
    }
}

/// Summary cards over a filtered roster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RosterStats {
    pub total: usize,
    pub excellent: usize,
    pub attention: usize,
    pub critical: usize,
}

impl RosterStats {
    pub fn from_students(students: &[&Student]) -> Self {
        Self {
            total: students.len(),
            excellent: students.iter().filter(|s| s.points >= 20).count(),
            attention: students
                .iter()
                .filter(|s| s.points < 0 && s.points >= -5)
                .count(),
            critical: students.iter().filter(|s| s.points < -5).count(),
        }
    }
}

fn signed(points: i64) -> String {
    if points > 0 {
        format!("+{}", points)
    } else {
        points.to_string()
    }
}

/// Plain-text table for the terminal
pub fn render_table(students: &[&Student]) -> String {
    let mut out = format!(
        "{:>6}  {:<20} {:<16} {:<7} {:>7}  {:<10} {}\n",
        "ID", "Nom", "Prénom", "Niveau", "Points", "Statut", "Dernière activité"
    );

    for student in students {
        let activity = student
            .last_activity
            .as_ref()
            .map(|l| l.display_date())
            .unwrap_or_else(|| "-".to_string());

        out.push_str(&format!(
            "{:>6}  {:<20} {:<16} {:<7} {:>7}  {:<10} {}\n",
            student.id,
            student.nom,
            student.prenom,
            student.niveau,
            signed(student.points),
            Standing::from_points(student.points),
            activity
        ));
    }

    out
}

/// Alphabetical order ignoring case and accents, with the accented form
/// after the plain one when they otherwise tie ("Elise" < "Élise" < "Emma")
fn compare_names(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.to_lowercase(), b.to_lowercase());
    let folded = |s: &str| s.chars().map(fold_accent).collect::<String>();
    folded(&a).cmp(&folded(&b)).then_with(|| a.cmp(&b))
}

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::LastActivity;

    fn student(id: i64, nom: &str, niveau: &str, points: i64, activity: Option<&str>) -> Student {
        Student {
            id,
            nom: nom.to_string(),
            prenom: "Test".to_string(),
            niveau: niveau.to_string(),
            points,
            status: if points < -5 { "critical" } else { "active" }.to_string(),
            last_activity: activity.map(|a| LastActivity::Text(a.to_string())),
        }
    }

    fn roster() -> Vec<Student> {
        vec![
            student(12, "Durand", "L2", 22, Some("2024-03-05")),
            student(7, "martin", "L1", -7, Some("2024-03-07")),
            student(31, "Bernard", "L1", -2, None),
            student(120, "Petit", "M1", 10, Some("2024-03-06")),
        ]
    }

    fn ids(students: &[&Student]) -> Vec<i64> {
        students.iter().map(|s| s.id).collect()
    }

    #[test]
    fn test_standing_thresholds() {
        assert_eq!(Standing::from_points(20), Standing::Excellent);
        assert_eq!(Standing::from_points(19), Standing::Bon);
        assert_eq!(Standing::from_points(10), Standing::Bon);
        assert_eq!(Standing::from_points(0), Standing::Moyen);
        assert_eq!(Standing::from_points(-5), Standing::Attention);
        assert_eq!(Standing::from_points(-6), Standing::Critique);
    }

    #[test]
    fn test_default_sort_is_by_name() {
        let students = roster();
        let result = RosterQuery::default().apply(&students);
        assert_eq!(ids(&result), vec![31, 12, 7, 120]);
    }

    #[test]
    fn test_sort_keys() {
        let students = roster();

        let by_points = RosterQuery {
            sort: SortKey::Points,
            ..Default::default()
        };
        assert_eq!(ids(&by_points.apply(&students)), vec![12, 120, 31, 7]);

        let by_niveau = RosterQuery {
            sort: SortKey::Niveau,
            ..Default::default()
        };
        assert_eq!(ids(&by_niveau.apply(&students)), vec![7, 31, 12, 120]);

        let by_activity = RosterQuery {
            sort: SortKey::LastActivity,
            ..Default::default()
        };
        assert_eq!(ids(&by_activity.apply(&students)), vec![7, 120, 12, 31]);
    }

    #[test]
    fn test_search_matches_name_or_id() {
        let students = roster();

        let by_name = RosterQuery {
            search: Some("MAR".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&by_name.apply(&students)), vec![7]);

        let by_id = RosterQuery {
            search: Some("12".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&by_id.apply(&students)), vec![12, 120]);
    }

    #[test]
    fn test_filters_and_all() {
        let students = roster();

        let l1 = RosterQuery {
            niveau: Some("L1".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&l1.apply(&students)), vec![31, 7]);

        let all = RosterQuery {
            niveau: Some("all".to_string()),
            status: Some("critical".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&all.apply(&students)), vec![7]);
    }

    #[test]
    fn test_stats_over_filtered_roster() {
        let students = roster();
        let everyone = RosterQuery::default().apply(&students);

        assert_eq!(
            RosterStats::from_students(&everyone),
            RosterStats {
                total: 4,
                excellent: 1,
                attention: 1,
                critical: 1,
            }
        );

        let l2 = RosterQuery {
            niveau: Some("L2".to_string()),
            ..Default::default()
        };
        assert_eq!(RosterStats::from_students(&l2.apply(&students)).total, 1);
    }

    #[test]
    fn test_name_sort_ignores_accents() {
        let students = vec![
            student(1, "Zola", "L1", 0, None),
            student(2, "Élise", "L1", 0, None),
            student(3, "Emma", "L1", 0, None),
            student(4, "Elise", "L1", 0, None),
            student(5, "Çelik", "L1", 0, None),
            student(6, "Dupont", "L1", 0, None),
        ];

        let result = RosterQuery::default().apply(&students);
        assert_eq!(ids(&result), vec![5, 6, 4, 2, 3, 1]);
    }

    #[test]
    fn test_sort_key_parsing() {
        assert_eq!("points".parse::<SortKey>().unwrap(), SortKey::Points);
        assert_eq!("last_activity".parse::<SortKey>().unwrap(), SortKey::LastActivity);
        assert!("age".parse::<SortKey>().is_err());
    }

    #[test]
    fn test_table_shows_signed_points_and_badges() {
        let students = roster();
        let table = render_table(&RosterQuery::default().apply(&students));

        assert!(table.contains("+22"));
        assert!(table.contains("Excellent"));
        assert!(table.contains("Critique"));
        assert!(table.contains("05/03/2024"));
        assert_eq!(table.lines().count(), 5);
    }
}
