use chrono::{DateTime, Local, Utc};
use finparcel_core::{Parcel, ParcelStatus};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};

use crate::app::{App, Panel};
use crate::config::Translations;

pub(crate) fn draw(frame: &mut Frame<'_>, app: &App) {
    let area = frame.area();

    // Outer layout: title, main content, status line
    let layout_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [header_area, content_area, status_area] = chunks else {
        return;
    };

    frame.render_widget(header(app), *header_area);

    match &app.panel {
        Panel::Loading => draw_message(
            frame,
            *content_area,
            &app.translations.loading,
            Style::default(),
        ),
        Panel::Failed(message) => draw_message(
            frame,
            *content_area,
            &format!("{}: {message}", app.translations.error),
            Style::default().fg(Color::Red),
        ),
        Panel::Parcels(parcels) if parcels.is_empty() => draw_message(
            frame,
            *content_area,
            &app.translations.no_parcels,
            Style::default(),
        ),
        Panel::Parcels(parcels) => draw_parcels(frame, app, parcels, *content_area),
    }

    // Status bar
    let nav_hint = "↑/↓ scroll · r refresh · q/Ctrl-C quit";
    let (status_text, status_style) = if app.is_refreshing {
        (
            format!("Refreshing… · {nav_hint}"),
            Style::default().fg(Color::Yellow),
        )
    } else {
        (nav_hint.to_owned(), Style::default())
    };

    let status = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .style(status_style)
        .wrap(Wrap { trim: true });

    frame.render_widget(status, *status_area);
}

fn header(app: &App) -> Paragraph<'static> {
    let carriers = app
        .carriers
        .iter()
        .map(|(meta, enabled)| {
            let marker = if *enabled { "on" } else { "off" };
            format!("{} ({marker})", meta.name)
        })
        .collect::<Vec<_>>()
        .join(" · ");

    let updated = app.last_updated.map_or_else(
        || "never".to_owned(),
        |at| at.format("%-d.%-m.%Y %H:%M").to_string(),
    );

    Paragraph::new(format!("{carriers} · updated {updated}"))
        .block(Block::default().borders(Borders::ALL).title("Finparcel"))
}

fn draw_message(frame: &mut Frame<'_>, area: Rect, text: &str, style: Style) {
    let paragraph = Paragraph::new(text.to_owned())
        .block(Block::default().borders(Borders::ALL).title("Parcels"))
        .style(style)
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn draw_parcels(frame: &mut Frame<'_>, app: &App, parcels: &[Parcel], area: Rect) {
    let items = parcels
        .iter()
        .map(|parcel| parcel_item(parcel, app.show_from_to, &app.translations))
        .collect::<Vec<ListItem<'_>>>();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Parcels ({})", parcels.len())),
        )
        .highlight_style(Style::default().add_modifier(Modifier::BOLD));

    let mut state = ListState::default().with_offset(app.scroll);
    state.select(Some(app.scroll));
    frame.render_stateful_widget(list, area, &mut state);
}

fn parcel_item<'item>(
    parcel: &'item Parcel,
    show_from_to: bool,
    translations: &Translations,
) -> ListItem<'item> {
    let color = status_color(parcel.status);
    let muted = Style::default().fg(Color::DarkGray);

    let mut lines = vec![Line::from(vec![
        Span::styled(format!("{} ", status_icon(parcel.status)), Style::default().fg(color)),
        Span::styled(
            parcel.shipment_number.as_str(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(status_label(parcel, translations), Style::default().fg(color)),
        Span::raw("  "),
        Span::styled(format_date(parcel.latest_event_date), muted),
    ])];

    if show_from_to {
        if let Some(sender) = parcel.sender_label() {
            lines.push(Line::from(format!("   from {sender}")));
        }
        if let Some(destination) = parcel.destination_label() {
            lines.push(Line::from(format!("   to   {destination}")));
        }
    }

    if let Some(event) = event_line(parcel) {
        lines.push(Line::styled(format!("   {event}"), muted));
    }

    ListItem::new(lines)
}

/// Translated label, or the carrier's own wording where no label fits.
fn status_label(parcel: &Parcel, translations: &Translations) -> String {
    let label = translations.statuses.get(parcel.status.ordinal());

    match (label, parcel.status) {
        (_, ParcelStatus::Unknown) | (None, _) => parcel.raw_status.clone(),
        (Some(label), status) if status.shows_raw_status() && !parcel.raw_status.is_empty() => {
            format!("{label}: {}", parcel.raw_status)
        }
        (Some(label), _) => label.clone(),
    }
}

fn event_line(parcel: &Parcel) -> Option<String> {
    let event = parcel.latest_event.as_deref().filter(|text| !text.is_empty())?;

    let place = [
        parcel.latest_event_city.as_deref(),
        parcel.latest_event_country.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>();

    if place.is_empty() {
        Some(event.to_owned())
    } else {
        Some(format!("{event} ({})", place.join(", ")))
    }
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|at| at.with_timezone(&Local).format("%-d.%-m.%Y %H:%M").to_string())
        .unwrap_or_default()
}

fn status_icon(status: ParcelStatus) -> &'static str {
    match status {
        ParcelStatus::Delivered => "✔",
        ParcelStatus::InfoReceived => "ℹ",
        ParcelStatus::Pending => "…",
        ParcelStatus::InTransit => "➜",
        ParcelStatus::BeingDelivered => "🚚",
        ParcelStatus::ReadyForPickup => "📦",
        ParcelStatus::Exception => "⚠",
        ParcelStatus::Unknown => "?",
    }
}

fn status_color(status: ParcelStatus) -> Color {
    match status {
        ParcelStatus::Delivered => Color::Gray,
        ParcelStatus::InfoReceived | ParcelStatus::Pending => Color::LightBlue,
        ParcelStatus::InTransit | ParcelStatus::BeingDelivered | ParcelStatus::ReadyForPickup => {
            Color::Green
        }
        ParcelStatus::Exception | ParcelStatus::Unknown => Color::Red,
    }
}
