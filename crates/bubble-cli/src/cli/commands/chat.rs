//! Interactive chat command.
//!
//! Reads one message per line from stdin and streams the bot's reply to
//! stdout. Forms requested by the bot are filled in line by line.
//!
//! Commands: `:new` starts a new conversation, `:q` quits (offering the
//! rating prompt first). Typing `:cancel` inside a form abandons it.

use std::io::{self, Write};

use anyhow::{Context, Result};
use bubble_core::action::FieldSpec;
use bubble_core::config::Config;
use bubble_core::forms::{
    APPOINTMENT_SUCCESS_MESSAGE, AppointmentForm, FormError, LEAD_SUCCESS_MESSAGE, LeadForm,
};
use bubble_core::rating::{InactivityTimer, RatingChoice};
use bubble_core::session::SessionStore;
use bubble_core::stream::{FinalizeResult, RenderUpdate};
use bubble_core::{ChatWidget, SendOutcome, WidgetView};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

const CANCEL: &str = ":cancel";

pub struct ChatOptions {
    pub show_html: bool,
}

pub async fn run(config: &Config, options: ChatOptions) -> Result<()> {
    let store = SessionStore::open().context("open session state")?;
    let widget = ChatWidget::from_config(config, Some(store))?;
    let input = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "Chatting with {}. Type a message, :new for a new conversation, :q to quit.",
        config.api_base
    );

    let mut chat = ChatLoop {
        widget: &widget,
        input,
        view: TerminalView::new(options.show_html),
        timer: InactivityTimer::from_config(&config.rating),
        rating_enabled: config.rating.enabled,
        rating_offered: false,
    };
    chat.run().await
}

enum PendingForm {
    Lead(LeadForm),
    Appointment(AppointmentForm),
}

/// Prints replies incrementally. Display texts of one reply only ever grow,
/// so each update prints just the new suffix.
struct TerminalView {
    show_html: bool,
    shown: String,
    streaming: bool,
    pending: Option<PendingForm>,
}

impl TerminalView {
    fn new(show_html: bool) -> Self {
        Self {
            show_html,
            shown: String::new(),
            streaming: false,
            pending: None,
        }
    }

    fn print_delta(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.streaming {
            print!("bot> ");
            self.streaming = true;
        }
        match text.strip_prefix(self.shown.as_str()) {
            Some(delta) => print!("{delta}"),
            None => print!("\n{text}"),
        }
        let _ = io::stdout().flush();
        self.shown = text.to_string();
    }

    fn end_line(&mut self) {
        if self.streaming {
            println!();
        }
        self.streaming = false;
        self.shown.clear();
    }
}

impl WidgetView for TerminalView {
    fn show_user_message(&mut self, _text: &str) {
        self.end_line();
    }

    fn render_bot(&mut self, update: &RenderUpdate) {
        self.print_delta(&update.display_text);
    }

    fn finish_bot(&mut self, result: &FinalizeResult) {
        self.print_delta(&result.text);
        self.end_line();
        if self.show_html && result.body.is_html() {
            println!("{}", result.body.as_str());
        }
    }

    fn show_error(&mut self, message: &str) {
        self.end_line();
        println!("bot> {message}");
    }

    fn open_lead_form(&mut self, form: LeadForm) {
        self.pending = Some(PendingForm::Lead(form));
    }

    fn open_appointment_form(&mut self, form: AppointmentForm) {
        self.pending = Some(PendingForm::Appointment(form));
    }
}

struct ChatLoop<'a, R> {
    widget: &'a ChatWidget,
    input: Lines<R>,
    view: TerminalView,
    timer: InactivityTimer,
    rating_enabled: bool,
    rating_offered: bool,
}

impl<R: AsyncBufRead + Unpin> ChatLoop<'_, R> {
    async fn run(&mut self) -> Result<()> {
        loop {
            prompt("> ");
            let line = tokio::select! {
                line = self.input.next_line() => line.context("read input")?,
                () = self.timer.expired() => {
                    self.timer.cancel();
                    println!();
                    self.offer_rating().await?;
                    continue;
                }
            };
            let Some(line) = line else {
                break;
            };

            match line.trim() {
                ":q" | ":quit" => {
                    self.offer_rating().await?;
                    break;
                }
                ":new" => {
                    self.widget.reset_session().await?;
                    self.rating_offered = false;
                    println!("Started a new conversation.");
                    continue;
                }
                _ => {}
            }

            self.timer.reset();
            match self.widget.send_message(&line, &mut self.view).await {
                SendOutcome::Completed(_) => self.timer.reset(),
                SendOutcome::Ignored | SendOutcome::Failed(_) => {}
                SendOutcome::Busy => println!("Still answering, please wait."),
            }

            match self.view.pending.take() {
                Some(PendingForm::Lead(form)) => self.fill_lead(form).await?,
                Some(PendingForm::Appointment(form)) => self.fill_appointment(form).await?,
                None => {}
            }
        }
        Ok(())
    }

    /// Prints `label` and reads one line. `None` on end of input or `:cancel`.
    async fn ask(&mut self, label: &str) -> Result<Option<String>> {
        prompt(label);
        let line = self.input.next_line().await.context("read input")?;
        Ok(line.filter(|value| value.trim() != CANCEL))
    }

    async fn offer_rating(&mut self) -> Result<()> {
        if !self.rating_enabled || self.rating_offered || !self.widget.rating_prompt_due().await {
            return Ok(());
        }
        self.rating_offered = true;

        println!("How would you rate this conversation?");
        let choice = loop {
            let Some(answer) = self.ask("Stars 1-5 (Enter to skip): ").await? else {
                break RatingChoice::Dismissed;
            };
            match RatingChoice::parse(&answer) {
                Ok(choice) => break choice,
                Err(err) => println!("{err}"),
            }
        };

        match self.widget.answer_rating(choice).await {
            Ok(Some(_)) => println!("Thank you for your feedback!"),
            Ok(None) => {}
            Err(err) => println!("Could not submit rating: {err:#}"),
        }
        Ok(())
    }

    async fn fill_lead(&mut self, mut form: LeadForm) -> Result<()> {
        println!(
            "{}",
            form.reason()
                .unwrap_or("Please leave your details and we will get back to you.")
        );
        if !self.fill_fields(form.fields().to_vec(), |name, value| form.set(name, value)).await? {
            println!("Form cancelled.");
            return Ok(());
        }
        match self.widget.submit_lead(&form).await {
            Ok(()) => println!("bot> {LEAD_SUCCESS_MESSAGE}"),
            Err(err) => println!("Could not send your details, please try again later. ({err:#})"),
        }
        Ok(())
    }

    async fn fill_appointment(&mut self, mut form: AppointmentForm) -> Result<()> {
        println!("{}", form.reason().unwrap_or("Let's book an appointment."));
        if !self.fill_fields(form.fields().to_vec(), |name, value| form.set(name, value)).await? {
            println!("Form cancelled.");
            return Ok(());
        }

        loop {
            let Some(date) = self.ask("Date (YYYY-MM-DD): ").await? else {
                println!("Form cancelled.");
                return Ok(());
            };
            if let Err(err) = form.set_date(&date) {
                println!("{err}");
                continue;
            }

            let slots = match self.widget.available_slots(&form).await {
                Ok(slots) => slots,
                Err(err) => {
                    println!("Could not load available times. ({err:#})");
                    return Ok(());
                }
            };
            if slots.is_empty() {
                println!("No available times on that date, please pick another day.");
                continue;
            }
            for (index, slot) in slots.iter().enumerate() {
                println!("  {}. {slot}", index + 1);
            }

            let Some(choice) = self.ask("Time (number): ").await? else {
                println!("Form cancelled.");
                return Ok(());
            };
            let selected = choice
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|index| slots.get(index));
            match selected {
                Some(slot) => {
                    form.select_slot(slot.clone());
                    break;
                }
                None => println!("Please choose one of the listed numbers."),
            }
        }

        match self.widget.book_appointment(&form).await {
            Ok(_) => println!("bot> {APPOINTMENT_SUCCESS_MESSAGE}"),
            Err(err) => println!("Could not book the appointment. ({err:#})"),
        }
        Ok(())
    }

    /// Asks for every field in order. Returns `false` if the user cancelled.
    async fn fill_fields(
        &mut self,
        fields: Vec<FieldSpec>,
        mut set: impl FnMut(&str, &str) -> Result<(), FormError>,
    ) -> Result<bool> {
        for field in fields {
            let marker = if field.required { "*" } else { "" };
            let Some(value) = self.ask(&format!("{}{marker}: ", field.label)).await? else {
                return Ok(false);
            };
            set(&field.name, &value)?;
        }
        Ok(true)
    }
}

fn prompt(label: &str) {
    print!("{label}");
    let _ = io::stdout().flush();
}
