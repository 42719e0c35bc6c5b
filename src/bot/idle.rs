//! Auto-leave timers for guilds where the bot was left alone.

use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::GuildId;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::debug;

pub struct IdleTimers {
    timeout: Duration,
    jobs: Arc<DashMap<GuildId, JoinHandle<()>>>,
}

impl IdleTimers {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            jobs: Arc::new(DashMap::new()),
        }
    }

    /// Runs `on_expire` after the timeout unless [`cancel`](Self::cancel) is
    /// called first. Returns false if a timer is already pending for the guild.
    pub fn schedule<F>(&self, guild_id: GuildId, on_expire: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.jobs.entry(guild_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let jobs = self.jobs.clone();
                let timeout = self.timeout;
                debug!("⏳ Auto-desconexión programada en {:?} para guild {}", timeout, guild_id);
                slot.insert(tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    // Leave the map before expiring so a cancel from the
                    // resulting disconnect cannot abort us halfway.
                    jobs.remove(&guild_id);
                    on_expire.await;
                }));
                true
            }
        }
    }

    pub fn cancel(&self, guild_id: GuildId) -> bool {
        match self.jobs.remove(&guild_id) {
            Some((_, job)) => {
                job.abort();
                debug!("⏳ Auto-desconexión cancelada para guild {}", guild_id);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, guild_id: GuildId) -> bool {
        self.jobs.contains_key(&guild_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SHORT: Duration = Duration::from_millis(20);

    fn bump(fired: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let fired = fired.clone();
        async move {
            fired.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn fires_after_timeout() {
        let timers = IdleTimers::new(SHORT);
        let fired = Arc::new(AtomicUsize::new(0));
        let guild = GuildId::new(1);

        assert!(timers.schedule(guild, bump(&fired)));
        assert!(timers.is_pending(guild));

        tokio::time::sleep(SHORT * 5).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timers.is_pending(guild));
    }

    #[tokio::test]
    async fn cancel_prevents_expiry() {
        let timers = IdleTimers::new(SHORT);
        let fired = Arc::new(AtomicUsize::new(0));
        let guild = GuildId::new(2);

        timers.schedule(guild, bump(&fired));
        assert!(timers.cancel(guild));

        tokio::time::sleep(SHORT * 5).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!timers.cancel(guild));
    }

    #[tokio::test]
    async fn pending_timer_is_not_rescheduled() {
        let timers = IdleTimers::new(SHORT);
        let fired = Arc::new(AtomicUsize::new(0));
        let guild = GuildId::new(3);

        assert!(timers.schedule(guild, bump(&fired)));
        assert!(!timers.schedule(guild, bump(&fired)));

        tokio::time::sleep(SHORT * 5).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
