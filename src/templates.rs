//! SMS message templates.
//!
//! Rendering never fails: an unknown template kind produces an empty string,
//! which callers treat as "no message produced".

use std::str::FromStr;

/// The notification templates the service knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// Args: customer name, equipment name, start date, end date.
    RentalConfirmation,
    /// Args: customer name, equipment name, delivery date.
    DeliveryReminder,
    /// Args: customer name, equipment name, pickup date.
    PickupReminder,
    /// Args: customer name, amount, due date.
    PaymentDue,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 4] = [
        TemplateKind::RentalConfirmation,
        TemplateKind::DeliveryReminder,
        TemplateKind::PickupReminder,
        TemplateKind::PaymentDue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::RentalConfirmation => "rental_confirmation",
            TemplateKind::DeliveryReminder => "delivery_reminder",
            TemplateKind::PickupReminder => "pickup_reminder",
            TemplateKind::PaymentDue => "payment_due",
        }
    }

    /// Number of positional arguments the template interpolates.
    pub fn arity(&self) -> usize {
        match self {
            TemplateKind::RentalConfirmation => 4,
            TemplateKind::DeliveryReminder
            | TemplateKind::PickupReminder
            | TemplateKind::PaymentDue => 3,
        }
    }

    /// Interpolates `args` into the template. Missing args render as empty text.
    pub fn render<S: AsRef<str>>(&self, args: &[S]) -> String {
        let arg = |i: usize| args.get(i).map(|a| a.as_ref()).unwrap_or("");

        match self {
            TemplateKind::RentalConfirmation => format!(
                "Hi {}! Your rental of {} is confirmed from {} to {}. Thank you for your business!",
                arg(0),
                arg(1),
                arg(2),
                arg(3)
            ),
            TemplateKind::DeliveryReminder => format!(
                "Hi {}, reminder: your {} will be delivered on {}. Please make sure someone is available to receive it.",
                arg(0),
                arg(1),
                arg(2)
            ),
            TemplateKind::PickupReminder => format!(
                "Hi {}, reminder: we will pick up your {} on {}. Please have it ready for collection.",
                arg(0),
                arg(1),
                arg(2)
            ),
            TemplateKind::PaymentDue => format!(
                "Hi {}, a payment of {} is due on {}. Reply to this message if you have any questions.",
                arg(0),
                arg(1),
                arg(2)
            ),
        }
    }
}

impl FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TemplateKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown template '{}'", s))
    }
}

/// Renders the template named `kind`; empty string when the name is unknown.
pub fn render_template<S: AsRef<str>>(kind: &str, args: &[S]) -> String {
    match kind.parse::<TemplateKind>() {
        Ok(kind) => kind.render(args),
        Err(_) => {
            tracing::debug!("No template named '{}', nothing rendered", kind);
            String::new()
        }
    }
}
