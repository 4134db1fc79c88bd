//! Execution-context lifecycle: one context per process, one token per
//! attached thread, a live-call count that gates teardown.

use std::collections::HashMap;
use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread::ThreadId;

use trestle_abi::ExecutionToken;

#[derive(Debug)]
pub enum ContextError {
    /// The context could not be brought up, e.g. because one is already live.
    Initialization(&'static str),
    /// Teardown was refused; boundary calls are still running.
    Teardown { in_flight: usize },
    /// The handle does not name the live context (null, destroyed, or from a
    /// different lifetime).
    StaleHandle,
    /// The token's thread has detached.
    Detached,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::Initialization(why) => {
                write!(f, "execution context initialization failed: {why}")
            }
            ContextError::Teardown { in_flight } => {
                write!(f, "teardown refused: {in_flight} boundary call(s) in flight")
            }
            ContextError::StaleHandle => write!(f, "handle does not name the live context"),
            ContextError::Detached => write!(f, "execution token is detached"),
        }
    }
}

impl std::error::Error for ContextError {}

struct ThreadAttachment {
    context: *mut ExecutionContext,
    active: AtomicBool,
}

pub(crate) struct ExecutionContext {
    in_flight: AtomicUsize,
    attachments: Mutex<HashMap<ThreadId, *mut ThreadAttachment>>,
    // Detached attachments stay allocated until teardown so stale tokens can
    // still be recognized as detached instead of dereferencing freed memory.
    retired: Mutex<Vec<*mut ThreadAttachment>>,
}

// Attachment pointers are only dereferenced after the live-context check; the
// maps themselves only move addresses around.
unsafe impl Send for ExecutionContext {}
unsafe impl Sync for ExecutionContext {}

/// Opaque handle to the live execution context.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ContextHandle {
    ptr: *mut ExecutionContext,
}

static CONTEXT_LIVE: AtomicBool = AtomicBool::new(false);
static CURRENT_CONTEXT: AtomicPtr<ExecutionContext> = AtomicPtr::new(ptr::null_mut());

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Brings up the process-wide execution context and attaches the calling
/// thread. Exactly one context may be live at a time.
pub fn create_context() -> Result<(ContextHandle, ExecutionToken), ContextError> {
    if CONTEXT_LIVE
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(ContextError::Initialization(
            "an execution context is already live",
        ));
    }

    let ctx = Box::into_raw(Box::new(ExecutionContext {
        in_flight: AtomicUsize::new(0),
        attachments: Mutex::new(HashMap::new()),
        retired: Mutex::new(Vec::new()),
    }));
    CURRENT_CONTEXT.store(ctx, Ordering::SeqCst);

    let token = attach_current_thread(ctx);
    Ok((ContextHandle { ptr: ctx }, token))
}

/// Returns the calling thread's token, attaching the thread first if it has
/// none (or detached earlier).
pub fn current_execution_token(handle: ContextHandle) -> Result<ExecutionToken, ContextError> {
    let ctx = validate_handle(handle)?;
    Ok(attach_current_thread(ctx))
}

/// Invalidates a token. Boundary calls with it are rejected from here on; the
/// thread may re-attach through [`current_execution_token`].
pub fn detach_thread(token: ExecutionToken) -> Result<(), ContextError> {
    let attachment = token_attachment(token)?;
    attachment.active.store(false, Ordering::SeqCst);
    Ok(())
}

/// Tears the context down. Refused while boundary calls are in flight; once it
/// succeeds, every outstanding handle and token is dead.
pub fn destroy_context(handle: ContextHandle) -> Result<(), ContextError> {
    let ctx_ptr = validate_handle(handle)?;
    let in_flight = unsafe { &*ctx_ptr }.in_flight.load(Ordering::SeqCst);
    if in_flight != 0 {
        return Err(ContextError::Teardown { in_flight });
    }

    CURRENT_CONTEXT.store(ptr::null_mut(), Ordering::SeqCst);
    let ctx = unsafe { Box::from_raw(ctx_ptr) };
    let attachments = ctx
        .attachments
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    for (_, attachment) in attachments {
        drop(unsafe { Box::from_raw(attachment) });
    }
    let retired = ctx
        .retired
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    for attachment in retired {
        drop(unsafe { Box::from_raw(attachment) });
    }
    CONTEXT_LIVE.store(false, Ordering::SeqCst);
    Ok(())
}

fn validate_handle(handle: ContextHandle) -> Result<*mut ExecutionContext, ContextError> {
    let current = CURRENT_CONTEXT.load(Ordering::SeqCst);
    if handle.ptr.is_null() || current.is_null() || handle.ptr != current {
        return Err(ContextError::StaleHandle);
    }
    Ok(handle.ptr)
}

fn attach_current_thread(ctx: *mut ExecutionContext) -> ExecutionToken {
    let thread = std::thread::current().id();
    let context = unsafe { &*ctx };
    let mut map = lock(&context.attachments);
    if let Some(&existing) = map.get(&thread) {
        let attachment = unsafe { &*existing };
        if attachment.active.load(Ordering::SeqCst) {
            return ExecutionToken::from_raw(existing.cast());
        }
        lock(&context.retired).push(existing);
    }
    let attachment = Box::into_raw(Box::new(ThreadAttachment {
        context: ctx,
        active: AtomicBool::new(true),
    }));
    map.insert(thread, attachment);
    ExecutionToken::from_raw(attachment.cast())
}

// Valid attachments live until their context is torn down, which the
// live-context check rules out here.
fn token_attachment(token: ExecutionToken) -> Result<&'static ThreadAttachment, ContextError> {
    let raw = token.as_raw().cast::<ThreadAttachment>();
    if raw.is_null() {
        return Err(ContextError::Detached);
    }
    let current = CURRENT_CONTEXT.load(Ordering::SeqCst);
    if current.is_null() {
        return Err(ContextError::StaleHandle);
    }
    let attachment = unsafe { &*raw };
    if attachment.context != current {
        return Err(ContextError::StaleHandle);
    }
    if !attachment.active.load(Ordering::SeqCst) {
        return Err(ContextError::Detached);
    }
    Ok(attachment)
}

/// RAII scope for one boundary call: validates the token on entry and keeps
/// the in-flight count up until dropped, so teardown cannot race a live call.
pub(crate) struct CallScope {
    ctx: *mut ExecutionContext,
}

impl CallScope {
    pub(crate) fn enter(token: ExecutionToken) -> Option<CallScope> {
        let attachment = token_attachment(token).ok()?;
        let ctx = attachment.context;
        unsafe { &*ctx }.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(CallScope { ctx })
    }
}

impl Drop for CallScope {
    fn drop(&mut self) {
        unsafe { &*self.ctx }.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The context is process-wide, so the whole lifecycle is exercised in one
    // test to keep the harness's parallelism out of the picture.
    #[test]
    fn context_lifecycle() {
        let (ctx, token) = create_context().expect("first create");

        match create_context() {
            Err(ContextError::Initialization(_)) => {}
            other => panic!("second create should fail initialization, got {other:?}"),
        }

        // Re-attaching the same thread hands back the same token.
        let again = current_execution_token(ctx).expect("re-attach");
        assert_eq!(again, token);

        // A live call blocks teardown.
        let scope = CallScope::enter(token).expect("enter with live token");
        match destroy_context(ctx) {
            Err(ContextError::Teardown { in_flight: 1 }) => {}
            other => panic!("destroy with live call should be refused, got {other:?}"),
        }
        drop(scope);

        // Detached tokens are rejected, and the thread can re-attach fresh.
        detach_thread(token).expect("detach");
        assert!(CallScope::enter(token).is_none());
        let fresh = current_execution_token(ctx).expect("attach after detach");
        assert_ne!(fresh, token);
        assert!(CallScope::enter(fresh).is_some());

        destroy_context(ctx).expect("destroy");
        match destroy_context(ctx) {
            Err(ContextError::StaleHandle) => {}
            other => panic!("second destroy should see a stale handle, got {other:?}"),
        }
        match current_execution_token(ctx) {
            Err(ContextError::StaleHandle) => {}
            other => panic!("token lookup after destroy should fail, got {other:?}"),
        }

        // The process can bring up a fresh context after teardown.
        let (ctx2, token2) = create_context().expect("create after destroy");
        assert!(CallScope::enter(token2).is_some());
        destroy_context(ctx2).expect("destroy again");
    }
}
