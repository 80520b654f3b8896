//! Typed method handlers and the registration table.
//!
//! A handler is an async closure taking up to six positional arguments that
//! implement `DeserializeOwned`. Handlers registered with
//! [`Methods::method_with_context`] also receive the request [`Context`] as
//! their first argument, which is how a handler reaches the calling peer.
//!
//! [`Methods::method`] accepts any serializable return value as the result.
//! Handlers that can fail are registered with [`Methods::try_method`] and
//! return a `Result` whose error converts into an [`ErrResponse`]:
//!
//! ```ignore
//! let methods = Methods::new()
//!     .method("ping", || async { "pong" })
//!     .method("add", |a: i64, b: i64| async move { a + b })
//!     .try_method_with_context("greet", |ctx: Context, name: String| async move {
//!         let peer = ctx.service()?;
//!         peer.call::<String, _>("peer_hello", (name,)).await
//!     });
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::message::ErrResponse;
use crate::service::Context;

/// Boxed handler invocation.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, ErrResponse>> + Send>>;

/// Boxed future of a handler's raw return value.
pub type OutputFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Conversion from a fallible handler's return value into a response.
///
/// Errors map to internal-code responses unless they already are an
/// [`ErrResponse`]; a value that fails to serialize maps to a server-code
/// response.
pub trait IntoReply {
	fn into_reply(self) -> Result<Value, ErrResponse>;
}

fn serialize_reply<T: Serialize>(value: T) -> Result<Value, ErrResponse> {
	serde_json::to_value(value)
		.map_err(|err| ErrResponse::server(format!("failed to encode result: {err}")))
}

impl<T, E> IntoReply for Result<T, E>
where
	T: Serialize,
	E: Into<ErrResponse>,
{
	fn into_reply(self) -> Result<Value, ErrResponse> {
		match self {
			Ok(value) => serialize_reply(value),
			Err(err) => Err(err.into()),
		}
	}
}

/// An async function callable with positional params.
pub trait Handler<Args>: Clone + Send + Sync + 'static {
	/// What the handler's future resolves to.
	type Output: Send + 'static;

	/// Number of positional params the handler expects.
	const ARITY: usize;

	/// Decodes `params` and starts the call. Fails with an invalid-params
	/// response when a param does not decode.
	fn invoke(&self, params: Vec<Value>) -> Result<OutputFuture<Self::Output>, ErrResponse>;
}

/// An async function taking [`Context`] followed by positional params.
pub trait ContextHandler<Args>: Clone + Send + Sync + 'static {
	type Output: Send + 'static;

	const ARITY: usize;

	fn invoke(
		&self,
		ctx: Context,
		params: Vec<Value>,
	) -> Result<OutputFuture<Self::Output>, ErrResponse>;
}

fn decode_arg<T: DeserializeOwned>(position: &mut usize, value: Option<Value>) -> Result<T, ErrResponse> {
	let index = *position;
	*position += 1;
	serde_json::from_value(value.unwrap_or(Value::Null))
		.map_err(|err| ErrResponse::invalid_params(format!("invalid param {index}: {err}")))
}

macro_rules! impl_handlers {
	($arity:expr; $($arg:ident),*) => {
		impl<F, Fut, $($arg,)*> Handler<($($arg,)*)> for F
		where
			F: Fn($($arg),*) -> Fut + Clone + Send + Sync + 'static,
			Fut: Future + Send + 'static,
			Fut::Output: Send + 'static,
			$($arg: DeserializeOwned + Send + 'static,)*
		{
			type Output = Fut::Output;
			const ARITY: usize = $arity;

			#[allow(non_snake_case, unused_mut, unused_variables)]
			fn invoke(&self, params: Vec<Value>) -> Result<OutputFuture<Self::Output>, ErrResponse> {
				let mut params = params.into_iter();
				let mut position = 0usize;
				$(
					let $arg = decode_arg::<$arg>(&mut position, params.next())?;
				)*
				let fut: OutputFuture<Self::Output> = Box::pin((self)($($arg),*));
				Ok(fut)
			}
		}

		impl<F, Fut, $($arg,)*> ContextHandler<($($arg,)*)> for F
		where
			F: Fn(Context, $($arg),*) -> Fut + Clone + Send + Sync + 'static,
			Fut: Future + Send + 'static,
			Fut::Output: Send + 'static,
			$($arg: DeserializeOwned + Send + 'static,)*
		{
			type Output = Fut::Output;
			const ARITY: usize = $arity;

			#[allow(non_snake_case, unused_mut, unused_variables)]
			fn invoke(
				&self,
				ctx: Context,
				params: Vec<Value>,
			) -> Result<OutputFuture<Self::Output>, ErrResponse> {
				let mut params = params.into_iter();
				let mut position = 0usize;
				$(
					let $arg = decode_arg::<$arg>(&mut position, params.next())?;
				)*
				let fut: OutputFuture<Self::Output> = Box::pin((self)(ctx, $($arg),*));
				Ok(fut)
			}
		}
	};
}

impl_handlers!(0;);
impl_handlers!(1; A1);
impl_handlers!(2; A1, A2);
impl_handlers!(3; A1, A2, A3);
impl_handlers!(4; A1, A2, A3, A4);
impl_handlers!(5; A1, A2, A3, A4, A5);
impl_handlers!(6; A1, A2, A3, A4, A5, A6);

/// Turns a handler's raw output into a response.
type ReplyFn<T> = fn(T) -> Result<Value, ErrResponse>;

fn reply_with<T: Send + 'static>(
	started: Result<OutputFuture<T>, ErrResponse>,
	reply: ReplyFn<T>,
) -> HandlerFuture {
	match started {
		Ok(fut) => Box::pin(async move { reply(fut.await) }),
		Err(err) => Box::pin(async move { Err(err) }),
	}
}

/// Type-erased handler stored in the registry.
trait ErasedHandler: Send + Sync {
	fn call(&self, ctx: Context, params: Vec<Value>) -> HandlerFuture;
}

struct Plain<H, Args, T> {
	handler: H,
	reply: ReplyFn<T>,
	_args: PhantomData<fn() -> Args>,
}

impl<H, Args, T> ErasedHandler for Plain<H, Args, T>
where
	H: Handler<Args, Output = T>,
	Args: 'static,
	T: Send + 'static,
{
	fn call(&self, _ctx: Context, params: Vec<Value>) -> HandlerFuture {
		reply_with(self.handler.invoke(params), self.reply)
	}
}

struct WithContext<H, Args, T> {
	handler: H,
	reply: ReplyFn<T>,
	_args: PhantomData<fn() -> Args>,
}

impl<H, Args, T> ErasedHandler for WithContext<H, Args, T>
where
	H: ContextHandler<Args, Output = T>,
	Args: 'static,
	T: Send + 'static,
{
	fn call(&self, ctx: Context, params: Vec<Value>) -> HandlerFuture {
		reply_with(self.handler.invoke(ctx, params), self.reply)
	}
}

/// A registered method. Immutable once built.
#[derive(Clone)]
pub struct Method {
	name: String,
	arity: usize,
	takes_context: bool,
	handler: Arc<dyn ErasedHandler>,
}

impl Method {
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn arity(&self) -> usize {
		self.arity
	}

	pub fn takes_context(&self) -> bool {
		self.takes_context
	}

	pub(crate) fn renamed(mut self, name: String) -> Self {
		self.name = name;
		self
	}

	pub(crate) fn call(&self, ctx: Context, params: Vec<Value>) -> HandlerFuture {
		self.handler.call(ctx, params)
	}
}

impl std::fmt::Debug for Method {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Method")
			.field("name", &self.name)
			.field("arity", &self.arity)
			.field("takes_context", &self.takes_context)
			.finish()
	}
}

/// Method table built before registration.
#[derive(Default, Debug)]
pub struct Methods {
	entries: Vec<Method>,
}

impl Methods {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a handler taking only positional params. Whatever it returns is
	/// serialized as the result.
	pub fn method<H, Args>(self, name: &str, handler: H) -> Self
	where
		H: Handler<Args>,
		H::Output: Serialize,
		Args: 'static,
	{
		let reply: ReplyFn<H::Output> = serialize_reply;
		self.push(name, H::ARITY, false, Plain { handler, reply, _args: PhantomData })
	}

	/// Adds a handler returning `Result`; its error becomes the error response.
	pub fn try_method<H, Args>(self, name: &str, handler: H) -> Self
	where
		H: Handler<Args>,
		H::Output: IntoReply,
		Args: 'static,
	{
		let reply: ReplyFn<H::Output> = <H::Output as IntoReply>::into_reply;
		self.push(name, H::ARITY, false, Plain { handler, reply, _args: PhantomData })
	}

	/// Adds a handler that receives the request [`Context`] first.
	pub fn method_with_context<H, Args>(self, name: &str, handler: H) -> Self
	where
		H: ContextHandler<Args>,
		H::Output: Serialize,
		Args: 'static,
	{
		let reply: ReplyFn<H::Output> = serialize_reply;
		self.push(name, H::ARITY, true, WithContext { handler, reply, _args: PhantomData })
	}

	/// Fallible form of [`Methods::method_with_context`].
	pub fn try_method_with_context<H, Args>(self, name: &str, handler: H) -> Self
	where
		H: ContextHandler<Args>,
		H::Output: IntoReply,
		Args: 'static,
	{
		let reply: ReplyFn<H::Output> = <H::Output as IntoReply>::into_reply;
		self.push(name, H::ARITY, true, WithContext { handler, reply, _args: PhantomData })
	}

	fn push(
		mut self,
		name: &str,
		arity: usize,
		takes_context: bool,
		handler: impl ErasedHandler + 'static,
	) -> Self {
		self.entries.push(Method {
			name: name.to_string(),
			arity,
			takes_context,
			handler: Arc::new(handler),
		});
		self
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub(crate) fn into_entries(self) -> Vec<Method> {
		self.entries
	}
}

/// A type that exposes its own method table.
pub trait Receiver: Send + Sync + 'static {
	fn methods(self: Arc<Self>) -> Methods;
}
