use std::error::Error;

use exam_core::format_remaining;
use exam_core::{PaletteStatus, SubmitPhase, SubmitTrigger};
use exam_core::model::result::QuestionOutcome;
use services::{ExamCommand, ExamController, ExamRunner, ExamView, Instructions, ResultSummary};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

/// Line-oriented terminal front end for an attempt.
pub(crate) struct Console {
    input: Lines<BufReader<Stdin>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Command(ExamCommand),
    Show,
    Help,
    Quit,
}

impl Console {
    pub(crate) fn new() -> Self {
        Self {
            input: BufReader::new(io::stdin()).lines(),
        }
    }

    /// Ask a yes/no question; anything but `y`/`yes` is a no.
    pub(crate) async fn confirm(&mut self, prompt: &str) -> io::Result<bool> {
        let mut stdout = io::stdout();
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.flush().await?;
        let answer = self.input.next_line().await?.unwrap_or_default();
        Ok(matches!(
            answer.trim().to_ascii_lowercase().as_str(),
            "y" | "yes"
        ))
    }

    /// Drive the attempt until it is submitted or the candidate leaves.
    ///
    /// Leaving keeps the stored snapshot, so the attempt can be resumed later
    /// with the time that was left.
    pub(crate) async fn run_attempt(
        &mut self,
        controller: ExamController,
    ) -> Result<(), Box<dyn Error>> {
        let session_id = controller.exam().id();
        let handle = ExamRunner::spawn(controller);
        let mut views = handle.subscribe();
        let mut last_phase = handle.view().phase;
        let mut input_open = true;

        print_help();
        render(&handle.view());

        loop {
            tokio::select! {
                changed = views.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let view = views.borrow_and_update().clone();
                    if view.phase == last_phase {
                        continue;
                    }
                    last_phase = view.phase;
                    match view.phase {
                        SubmitPhase::Submitting(SubmitTrigger::Auto) => {
                            println!("Time is up. Submitting your answers...");
                        }
                        SubmitPhase::Submitting(SubmitTrigger::Manual) => {
                            println!("Submitting...");
                        }
                        SubmitPhase::Failed(trigger) => {
                            if let Some(notice) = &view.notice {
                                println!("{notice}");
                            }
                            match trigger {
                                SubmitTrigger::Manual => {
                                    println!("Type `s` to retry or `ack` to return to the test.");
                                }
                                SubmitTrigger::Auto => println!("Type `s` to retry."),
                            }
                        }
                        SubmitPhase::Submitted(result) => {
                            println!("Test submitted (result {result}).");
                            println!("See your score with: result {session_id}");
                            break;
                        }
                        SubmitPhase::Idle => render(&view),
                    }
                    if !input_open && !matches!(view.phase, SubmitPhase::Submitting(_)) {
                        println!("Input closed; your attempt is saved.");
                        break;
                    }
                }
                line = self.input.next_line(), if input_open => {
                    let Some(line) = line? else {
                        if matches!(handle.view().phase, SubmitPhase::Submitting(_)) {
                            // Leaving now would abort the request mid-flight.
                            input_open = false;
                            continue;
                        }
                        println!("Input closed; your attempt is saved.");
                        break;
                    };
                    let view = handle.view();
                    match parse_action(&line, &view) {
                        Ok(Action::Quit) => {
                            println!("Attempt saved. Resume with: attempt {session_id}");
                            break;
                        }
                        Ok(Action::Show) => render(&view),
                        Ok(Action::Help) => print_help(),
                        Ok(Action::Command(command)) => match handle.send(command).await {
                            Ok(()) if command != ExamCommand::Submit => render(&handle.view()),
                            Ok(()) => {}
                            Err(err) => println!("{}", err.user_message()),
                        },
                        Err(message) => println!("{message}"),
                    }
                }
            }
        }
        Ok(())
    }
}

fn parse_action(line: &str, view: &ExamView) -> Result<Action, String> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(Action::Show);
    };
    let argument = parts.next();

    let action = match verb.to_ascii_lowercase().as_str() {
        "v" | "view" => Action::Show,
        "h" | "help" | "?" => Action::Help,
        "q" | "quit" if matches!(view.phase, SubmitPhase::Submitting(_)) => {
            return Err("a submission is in progress; wait for it to finish".to_string());
        }
        "q" | "quit" => Action::Quit,
        "a" | "answer" => {
            let number = parse_position(argument, "a <choice number>")?;
            let choice = view
                .question
                .choices()
                .get(number - 1)
                .ok_or_else(|| {
                    format!("this question has {} choices", view.question.choices().len())
                })?;
            Action::Command(ExamCommand::SelectAnswer {
                question: view.question.id(),
                choice: choice.id(),
            })
        }
        "c" | "clear" => Action::Command(ExamCommand::ClearCurrent),
        "n" | "next" => Action::Command(ExamCommand::SaveAndNext),
        "m" | "mark" => Action::Command(ExamCommand::MarkForReviewAndNext),
        "p" | "prev" => Action::Command(ExamCommand::Previous),
        "g" | "goto" => {
            let number = parse_position(argument, "g <question number>")?;
            Action::Command(ExamCommand::GoTo(number - 1))
        }
        "s" | "submit" => Action::Command(ExamCommand::Submit),
        "ack" => Action::Command(ExamCommand::AcknowledgeFailure),
        other => return Err(format!("unknown command `{other}`; type `h` for help")),
    };
    Ok(action)
}

fn parse_position(raw: Option<&str>, usage: &str) -> Result<usize, String> {
    raw.and_then(|value| value.parse::<usize>().ok())
        .filter(|number| *number > 0)
        .ok_or_else(|| format!("usage: {usage}"))
}

fn print_help() {
    println!("Commands:");
    println!("  a <n>   select choice n        c      clear response");
    println!("  n       save and next          m      mark for review and next");
    println!("  p       previous question      g <n>  go to question n");
    println!("  s       submit                 ack    dismiss a failed submission");
    println!("  v       show question          q      leave (progress is saved)");
}

fn render(view: &ExamView) {
    println!();
    println!(
        "Question {}/{}   time left {}{}",
        view.current_index + 1,
        view.question_count,
        view.remaining_display(),
        if view.marked { "   [marked for review]" } else { "" }
    );
    println!("{}", view.question.text());
    if let Some(image) = view.question.image() {
        println!("  (image: {image})");
    }
    for (position, choice) in view.question.choices().iter().enumerate() {
        let selected = if view.selected == Some(choice.id()) { '*' } else { ' ' };
        println!(" {selected} {}. {}", position + 1, choice.text());
    }
    println!("{}", palette_line(&view.palette));
    println!(
        "answered {}  marked {}  answered+marked {}  not answered {}  not visited {}",
        view.counts.answered,
        view.counts.marked,
        view.counts.answered_and_marked,
        view.counts.not_answered,
        view.counts.not_visited
    );
}

fn palette_line(palette: &[PaletteStatus]) -> String {
    palette
        .iter()
        .enumerate()
        .map(|(index, status)| {
            let symbol = match status {
                PaletteStatus::AnsweredAndMarked => "A*",
                PaletteStatus::Marked => "M",
                PaletteStatus::Answered => "A",
                PaletteStatus::NotAnswered => "-",
                PaletteStatus::NotVisited => ".",
            };
            format!("{}:{symbol}", index + 1)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn print_instructions(instructions: &Instructions) {
    println!("Test {}", instructions.session_id);
    println!("  questions:   {}", instructions.question_count);
    println!("  duration:    {} minutes", instructions.duration_minutes);
    println!("  total marks: {}", instructions.total_marks);
    if instructions.resumed {
        println!(
            "  resuming with {} left",
            format_remaining(instructions.remaining_seconds)
        );
    }
    println!("The timer starts as soon as you begin and keeps its value if you leave.");
    println!("When it reaches zero your answers are submitted automatically.");
}

pub(crate) fn print_result(summary: &ResultSummary) {
    println!("Score:       {}", summary.result.score);
    println!("Percentage:  {:.2}%", summary.percentage);
    println!("Correct:     {}", summary.correct);
    println!("Incorrect:   {}", summary.incorrect);
    println!("Unattempted: {}", summary.unattempted);
    for (position, outcome) in summary.result.questions.iter().enumerate() {
        for line in outcome_lines(position, outcome) {
            println!("{line}");
        }
    }
}

fn outcome_lines(position: usize, outcome: &QuestionOutcome) -> Vec<String> {
    let question = &outcome.question;
    let mut lines = vec![format!(
        "  {}. {} ({:+} marks)",
        position + 1,
        question.text,
        outcome.awarded_marks
    )];
    if let Some(image) = &question.image {
        lines.push(format!("     (image: {image})"));
    }

    if question.is_numerical() {
        let answer = outcome
            .nat_answer
            .as_ref()
            .map_or_else(|| "not answered".to_string(), ToString::to_string);
        lines.push(format!("     your answer: {answer}"));
        if let (Some(min), Some(max)) = (&question.nat_min, &question.nat_max) {
            lines.push(format!("     correct range: {min} - {max}"));
        }
        return lines;
    }

    for choice in &question.choices {
        let tags = match (choice.is_correct, outcome.is_selected(choice.id)) {
            (true, true) => " (correct answer) (your answer)",
            (true, false) => " (correct answer)",
            (false, true) => " (your answer)",
            (false, false) => "",
        };
        lines.push(format!("     - {}{tags}", choice.text));
    }
    lines
}
