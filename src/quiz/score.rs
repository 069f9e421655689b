use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    fn from_percentage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            Grade::A
        } else if percentage >= 80.0 {
            Grade::B
        } else if percentage >= 70.0 {
            Grade::C
        } else if percentage >= 60.0 {
            Grade::D
        } else {
            Grade::F
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Score {
    pub correct: usize,
    pub incorrect: usize,
    pub total: usize,
    pub percentage: f64,
    pub grade: Grade,
}

impl Default for Score {
    fn default() -> Self {
        Self {
            correct: 0,
            incorrect: 0,
            total: 0,
            percentage: 0.0,
            grade: Grade::F,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreakMilestone {
    pub streak: usize,
    /// Zero-based index of the answer that reached the streak.
    pub at: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Streaks {
    pub current: usize,
    pub longest: usize,
    pub milestones: Vec<StreakMilestone>,
}

/// A streak worth celebrating: exactly 3, exactly 5, or any multiple of 10.
pub fn is_streak_milestone(streak: usize) -> bool {
    streak == 3 || streak == 5 || (streak > 0 && streak % 10 == 0)
}

/// Score and streak aggregation over a sequence of answer outcomes. Sessions
/// delegate here so there is exactly one scoring rule.
pub struct ScoreCalculator;

impl ScoreCalculator {
    pub fn calculate<I>(answers: I) -> Score
    where
        I: IntoIterator<Item = bool>,
    {
        let (correct, total) = answers
            .into_iter()
            .fold((0usize, 0usize), |(correct, total), is_correct| {
                (correct + usize::from(is_correct), total + 1)
            });

        let percentage = if total > 0 {
            (correct as f64 * 100.0) / total as f64
        } else {
            0.0
        };

        Score {
            correct,
            incorrect: total - correct,
            total,
            percentage: (percentage * 100.0).round() / 100.0,
            grade: Grade::from_percentage(percentage),
        }
    }

    pub fn calculate_streaks<I>(answers: I) -> Streaks
    where
        I: IntoIterator<Item = bool>,
    {
        let mut streaks = Streaks::default();

        for (index, is_correct) in answers.into_iter().enumerate() {
            if is_correct {
                streaks.current += 1;
                streaks.longest = streaks.longest.max(streaks.current);

                if is_streak_milestone(streaks.current) {
                    streaks.milestones.push(StreakMilestone {
                        streak: streaks.current,
                        at: index,
                    });
                }
            } else {
                streaks.current = 0;
            }
        }

        streaks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_always_add_up() {
        let patterns: [&[bool]; 4] = [
            &[true],
            &[false, false],
            &[true, false, true, true, false],
            &[true; 12],
        ];
        for answers in patterns {
            let score = ScoreCalculator::calculate(answers.iter().copied());
            assert_eq!(score.correct + score.incorrect, score.total);
            assert_eq!(score.total, answers.len());
        }
    }

    #[test]
    fn test_percentage_rounds_to_two_decimals() {
        let score = ScoreCalculator::calculate([true, false, false]);
        assert_eq!(score.correct, 1);
        assert_eq!(score.percentage, 33.33);

        let score = ScoreCalculator::calculate([true, true, false]);
        assert_eq!(score.percentage, 66.67);
    }

    #[test]
    fn test_empty_answers_score_zero() {
        let score = ScoreCalculator::calculate(Vec::<bool>::new());
        assert_eq!(score, Score::default());
    }

    #[test]
    fn test_grade_thresholds() {
        let grade_for = |correct: usize| {
            let answers = (0..10).map(|i| i < correct);
            ScoreCalculator::calculate(answers).grade
        };
        assert_eq!(grade_for(10), Grade::A);
        assert_eq!(grade_for(9), Grade::A);
        assert_eq!(grade_for(8), Grade::B);
        assert_eq!(grade_for(7), Grade::C);
        assert_eq!(grade_for(6), Grade::D);
        assert_eq!(grade_for(5), Grade::F);
        assert_eq!(grade_for(0), Grade::F);
    }

    #[test]
    fn test_streaks_reset_on_wrong_answer() {
        let streaks = ScoreCalculator::calculate_streaks([true, true, true, false, true, true]);
        assert_eq!(streaks.longest, 3);
        assert_eq!(streaks.current, 2);
        assert_eq!(
            streaks.milestones,
            vec![StreakMilestone { streak: 3, at: 2 }]
        );
    }

    #[test]
    fn test_long_streak_milestones() {
        let mut answers = vec![true; 20];
        answers.push(false);
        let streaks = ScoreCalculator::calculate_streaks(answers);

        let reached: Vec<(usize, usize)> = streaks
            .milestones
            .iter()
            .map(|m| (m.streak, m.at))
            .collect();
        assert_eq!(reached, vec![(3, 2), (5, 4), (10, 9), (20, 19)]);
        assert_eq!(streaks.current, 0);
        assert_eq!(streaks.longest, 20);
    }

    #[test]
    fn test_milestone_predicate() {
        assert!(!is_streak_milestone(0));
        assert!(!is_streak_milestone(1));
        assert!(is_streak_milestone(3));
        assert!(!is_streak_milestone(4));
        assert!(is_streak_milestone(5));
        assert!(is_streak_milestone(10));
        assert!(!is_streak_milestone(15));
        assert!(is_streak_milestone(30));
    }
}
