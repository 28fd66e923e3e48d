//! Shared demo catalog for the demo database generator, tests and benchmarks.

use crate::database::{Database, DatabaseResult};
use crate::indexer::{rebuild_search_index, IndexStats};
use crate::models::GradeCounts;
use std::collections::HashMap;

pub struct DemoCourse {
    pub dept_abbr: &'static str,
    pub course_num: &'static str,
    pub class_desc: &'static str,
    /// Students across all demo terms
    pub students: i64,
}

pub struct DemoProfessor {
    pub name: &'static str,
    pub rmp_score: Option<f64>,
    /// `DEPT NUM` codes of courses taught
    pub teaches: &'static [&'static str],
}

/// Fall then spring; students split 60/40
pub const DEMO_TERMS: [u32; 2] = [202408, 202502];

pub const DEMO_DEPARTMENTS: &[(&str, &str)] = &[
    ("ACCT", "Accounting"),
    ("ARCH", "Architecture"),
    ("BIOS", "Biological Sciences"),
    ("CHBE", "Chemical & Biomolecular Engr"),
    ("CHEM", "Chemistry"),
    ("CS", "Computer Science"),
    ("ECE", "Electrical & Computer Engr"),
    ("ECON", "Economics"),
    ("ENGL", "English"),
    ("HIST", "History"),
    ("ISYE", "Industrial & Systems Engr"),
    ("MATH", "Mathematics"),
    ("ME", "Mechanical Engineering"),
    ("PHYS", "Physics"),
    ("PSYC", "Psychology"),
];

pub const DEMO_COURSES: &[DemoCourse] = &[
    DemoCourse { dept_abbr: "CS", course_num: "1301", class_desc: "Introduction to Computing", students: 4200 },
    DemoCourse { dept_abbr: "CS", course_num: "1331", class_desc: "Intro to Object Oriented Programming", students: 3600 },
    DemoCourse { dept_abbr: "CS", course_num: "1332", class_desc: "Data Structures & Algorithms", students: 3100 },
    DemoCourse { dept_abbr: "CS", course_num: "2110", class_desc: "Computer Organization & Programming", students: 2200 },
    DemoCourse { dept_abbr: "CS", course_num: "2340", class_desc: "Objects and Design", students: 2000 },
    DemoCourse { dept_abbr: "CS", course_num: "3510", class_desc: "Design & Analysis of Algorithms", students: 1800 },
    DemoCourse { dept_abbr: "CS", course_num: "4641", class_desc: "Machine Learning", students: 1500 },
    DemoCourse { dept_abbr: "CHEM", course_num: "1310", class_desc: "Principles of Chemistry", students: 2600 },
    DemoCourse { dept_abbr: "CHEM", course_num: "1211K", class_desc: "Chemical Principles I", students: 1900 },
    DemoCourse { dept_abbr: "CHEM", course_num: "2311", class_desc: "Organic Chemistry I", students: 1200 },
    DemoCourse { dept_abbr: "CHBE", course_num: "2100", class_desc: "Chemical Process Principles", students: 600 },
    DemoCourse { dept_abbr: "MATH", course_num: "1551", class_desc: "Differential Calculus", students: 3900 },
    DemoCourse { dept_abbr: "MATH", course_num: "1552", class_desc: "Integral Calculus", students: 3400 },
    DemoCourse { dept_abbr: "MATH", course_num: "1554", class_desc: "Linear Algebra", students: 3300 },
    DemoCourse { dept_abbr: "MATH", course_num: "2551", class_desc: "Multivariable Calculus", students: 2800 },
    DemoCourse { dept_abbr: "MATH", course_num: "3012", class_desc: "Applied Combinatorics", students: 1700 },
    DemoCourse { dept_abbr: "PHYS", course_num: "2211", class_desc: "Introductory Physics I", students: 3000 },
    DemoCourse { dept_abbr: "PHYS", course_num: "2212", class_desc: "Introductory Physics II", students: 2700 },
    DemoCourse { dept_abbr: "ECE", course_num: "2020", class_desc: "Digital System Design", students: 1400 },
    DemoCourse { dept_abbr: "ECE", course_num: "2040", class_desc: "Circuit Analysis", students: 1300 },
    DemoCourse { dept_abbr: "BIOS", course_num: "1107", class_desc: "Biological Principles", students: 1600 },
    DemoCourse { dept_abbr: "ME", course_num: "2016", class_desc: "Computing Techniques", students: 900 },
    DemoCourse { dept_abbr: "ISYE", course_num: "3770", class_desc: "Statistics & Applications", students: 1500 },
    DemoCourse { dept_abbr: "PSYC", course_num: "1101", class_desc: "General Psychology", students: 2100 },
    DemoCourse { dept_abbr: "ENGL", course_num: "1101", class_desc: "English Composition I", students: 2500 },
    DemoCourse { dept_abbr: "ENGL", course_num: "1102", class_desc: "English Composition II", students: 2300 },
    DemoCourse { dept_abbr: "ECON", course_num: "2100", class_desc: "Economic Analysis & Policy Problems", students: 1800 },
    DemoCourse { dept_abbr: "ACCT", course_num: "2101", class_desc: "Accounting I", students: 1100 },
    DemoCourse { dept_abbr: "ARCH", course_num: "1011", class_desc: "Architecture Design Foundation", students: 300 },
    DemoCourse { dept_abbr: "HIST", course_num: "2111", class_desc: "The United States to 1877", students: 1000 },
];

pub const DEMO_PROFESSORS: &[DemoProfessor] = &[
    DemoProfessor { name: "Smith, John", rmp_score: Some(4.1), teaches: &["CS 1301", "CS 1331"] },
    DemoProfessor { name: "Johnson, Emily", rmp_score: Some(3.8), teaches: &["CS 1332", "CS 2110"] },
    DemoProfessor { name: "Nguyen, Linh", rmp_score: Some(4.6), teaches: &["CS 3510", "CS 4641", "CS 2340"] },
    DemoProfessor { name: "Garcia, Maria", rmp_score: Some(3.2), teaches: &["CHEM 1310", "CHEM 1211K"] },
    DemoProfessor { name: "Chen, Wei", rmp_score: Some(4.4), teaches: &["CHEM 2311", "CHBE 2100"] },
    DemoProfessor { name: "Patel, Ravi", rmp_score: Some(2.9), teaches: &["MATH 1551", "MATH 1552"] },
    DemoProfessor { name: "Okafor, Chidi", rmp_score: Some(4.0), teaches: &["MATH 1554", "MATH 2551"] },
    DemoProfessor { name: "Kowalski, Anna", rmp_score: Some(3.5), teaches: &["MATH 3012", "ISYE 3770"] },
    DemoProfessor { name: "Brown, David", rmp_score: Some(3.9), teaches: &["PHYS 2211", "PHYS 2212"] },
    DemoProfessor { name: "Lee, Ana", rmp_score: None, teaches: &["ECE 2020", "ECE 2040"] },
    DemoProfessor { name: "Murphy, Sean", rmp_score: Some(3.0), teaches: &["BIOS 1107", "PSYC 1101"] },
    DemoProfessor { name: "Rossi, Marco", rmp_score: Some(4.8), teaches: &["ENGL 1101", "ENGL 1102"] },
    DemoProfessor { name: "Williams, Grace", rmp_score: Some(3.7), teaches: &["ECON 2100", "ACCT 2101"] },
    DemoProfessor { name: "Tanaka, Hiro", rmp_score: Some(4.2), teaches: &["ARCH 1011", "ME 2016"] },
    DemoProfessor { name: "Hughes, Claire", rmp_score: None, teaches: &["HIST 2111"] },
];

/// Deterministic letter-grade spread for `students`, varied by `seed`
pub fn demo_grades(students: i64, seed: usize) -> GradeCounts {
    let a = students * (35 + (seed as i64 * 7) % 25) / 100;
    let b = students * 25 / 100;
    let c = students * 10 / 100;
    let f = students * 2 / 100;
    let w = students * 2 / 100;
    let d = students - a - b - c - f - w;
    [("A", a), ("B", b), ("C", c), ("D", d), ("F", f), ("W", w)]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(grade, count)| (grade.to_string(), count))
        .collect()
}

/// Populate a writable database with the demo catalog, compute summaries and
/// build the search index.
pub fn seed_demo_catalog(db: &Database) -> DatabaseResult<IndexStats> {
    for (abbr, name) in DEMO_DEPARTMENTS {
        db.insert_department(abbr, name)?;
    }

    let mut taught_by: HashMap<&str, i64> = HashMap::new();
    for professor in DEMO_PROFESSORS {
        let id = db.insert_professor(professor.name, professor.rmp_score)?;
        for code in professor.teaches {
            taught_by.insert(*code, id);
        }
    }

    for (seed, course) in DEMO_COURSES.iter().enumerate() {
        let class_id = db.insert_course(course.dept_abbr, course.course_num, course.class_desc)?;
        let code = format!("{} {}", course.dept_abbr, course.course_num);
        let professor_id = taught_by.get(code.as_str()).copied();

        let fall = course.students * 6 / 10;
        let spring = course.students - fall;
        for (term, students) in DEMO_TERMS.iter().zip([fall, spring]) {
            db.record_term(class_id, professor_id, *term, &demo_grades(students, seed))?;
        }
    }

    db.refresh_summaries()?;
    rebuild_search_index(db)
}
