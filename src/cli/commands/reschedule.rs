use crate::client::notifications::{NotificationPlatform, Rescheduler};
use crate::config::Config;
use crate::state::SharedState;

pub async fn cmd_reschedule(config: Config) -> anyhow::Result<()> {
    let state = SharedState::new(config).await?;

    let count = state.rescheduler.reschedule_all().await?;
    println!("Scheduled {count} notifications");
    println!("{:-<60}", "");

    for notification in state.notification_platform.pending().await? {
        let title = if notification.title.is_empty() {
            "(silent refresh)"
        } else {
            notification.title.as_str()
        };
        println!(
            "{}  {:<28} {}",
            notification.at.format("%Y-%m-%d %H:%M UTC"),
            title,
            notification.body
        );
    }

    Ok(())
}
