//! Console autocomplete.
//!
//! Candidates come from three places: the variables of the paused frame, the
//! members of the library that owns the paused function (plus its unprefixed
//! imports), and, after a `.`, the members of whatever the receiver
//! expression evaluates to. Class and library metadata is memoized per
//! session in [`CoalescingCache`]s so typing does not refetch it.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use lumen_core::Observable;
use lumen_vm::{
    with_timeout, Class, ClassRef, Frame, FuncOwner, FuncRef, IsolateId, Library,
    LibraryDependency, LibraryRef, ObjectId, Value, VmError, VmService,
};

use crate::cache::CoalescingCache;
use crate::session::PauseState;

/// The console line split around the caret.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EditingParts {
    pub left_side: String,
    pub active_word: String,
    pub right_side: String,
}

impl EditingParts {
    /// Split `line` at byte offset `caret` (clamped to the line and to a char
    /// boundary). The active word is the run of identifier characters
    /// immediately left of the caret.
    pub fn from_line(line: &str, caret: usize) -> Self {
        let mut caret = caret.min(line.len());
        while !line.is_char_boundary(caret) {
            caret -= 1;
        }
        let (left, right) = line.split_at(caret);

        let start = left
            .char_indices()
            .rev()
            .take_while(|(_, ch)| is_identifier_char(*ch))
            .last()
            .map_or(left.len(), |(i, _)| i);

        Self {
            left_side: left[..start].to_string(),
            active_word: left[start..].to_string(),
            right_side: right.to_string(),
        }
    }

    /// Whether the active word follows a `.` (member access).
    pub fn is_field(&self) -> bool {
        self.left_side.ends_with('.')
    }
}

fn is_identifier_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '$'
}

/// Names that can be typed as a plain identifier; rules out operators such as
/// `==`, `[]=` or `unary-`.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {
            chars.all(is_identifier_char)
        }
        _ => false,
    }
}

fn is_private(name: &str) -> bool {
    name.starts_with('_')
}

/// Setter names carry a trailing `=`.
fn member_name(name: &str) -> &str {
    name.strip_suffix('=').unwrap_or(name)
}

/// `Some(None)` for the unnamed constructor, `Some(Some(name))` for a named
/// one and `None` when `function` is not a constructor of `class_name`.
fn constructor_name<'a>(class_name: &str, function: &'a str) -> Option<Option<&'a str>> {
    let rest = function.strip_prefix(class_name)?;
    if rest.is_empty() {
        return Some(None);
    }
    let named = rest.strip_prefix('.')?;
    Some((!named.is_empty()).then_some(named))
}

fn import_allows(dependency: &LibraryDependency, name: &str) -> bool {
    (dependency.shows.is_empty() || dependency.shows.iter().any(|shown| shown == name))
        && !dependency.hides.iter().any(|hidden| hidden == name)
}

/// The expression whose members are being completed: the trailing
/// expression of `left_side` before its final `.`.
fn receiver_expression(left_side: &str) -> &str {
    let Some(text) = left_side.strip_suffix('.') else {
        return "";
    };
    let mut depth = 0usize;
    let mut start = text.len();
    for (i, ch) in text.char_indices().rev() {
        match ch {
            ')' | ']' => depth += 1,
            '(' | '[' => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            _ if depth > 0 => {}
            ch if is_identifier_char(ch) || ch == '.' => {}
            _ => break,
        }
        start = i;
    }
    text[start..].trim()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum MemberScope {
    Static,
    Instance,
}

#[derive(Clone, Debug)]
struct ClassMember {
    name: String,
    library: ObjectId,
    script: Option<String>,
}

/// Where the paused code lives; decides which private members are visible.
#[derive(Debug, Default)]
struct CodeLocation {
    library: Option<LibraryRef>,
    script: Option<String>,
}

impl CodeLocation {
    fn can_see(&self, member: &ClassMember) -> bool {
        if !is_private(&member.name) {
            return true;
        }
        let same_library = self
            .library
            .as_ref()
            .is_some_and(|library| library.id == member.library);
        let same_script = self.script.is_some() && self.script == member.script;
        same_library || same_script
    }
}

type ClassKey = (IsolateId, ObjectId);

pub struct AutocompleteResolver {
    service: Arc<dyn VmService>,
    timeout: Duration,
    classes: CoalescingCache<ClassKey, Arc<Class>>,
    class_members: CoalescingCache<(IsolateId, ObjectId, MemberScope), Arc<Vec<ClassMember>>>,
    libraries: CoalescingCache<ClassKey, Arc<Library>>,
    library_members: CoalescingCache<ClassKey, Arc<Vec<String>>>,
    library_members_and_imports: CoalescingCache<ClassKey, Arc<Vec<String>>>,
}

impl AutocompleteResolver {
    pub fn new(service: Arc<dyn VmService>, timeout: Duration) -> Self {
        Self {
            service,
            timeout,
            classes: CoalescingCache::new(),
            class_members: CoalescingCache::new(),
            libraries: CoalescingCache::new(),
            library_members: CoalescingCache::new(),
            library_members_and_imports: CoalescingCache::new(),
        }
    }

    /// Forget all cached metadata. Called when the session disconnects.
    pub fn invalidate(&self) {
        self.classes.clear();
        self.class_members.clear();
        self.libraries.clear();
        self.library_members.clear();
        self.library_members_and_imports.clear();
    }

    /// Completion candidates for `parts`, filtered by the active word, in
    /// first-seen order without duplicates. Returns nothing unless paused.
    pub async fn resolve(&self, parts: &EditingParts, pause: Option<&PauseState>) -> Vec<String> {
        let Some(pause) = pause else {
            return Vec::new();
        };
        let Some(frame) = pause.frame() else {
            return Vec::new();
        };

        let location = CodeLocation {
            library: match &frame.function {
                Some(function) => self.owner_library(&pause.isolate, function).await,
                None => None,
            },
            script: frame
                .location
                .as_ref()
                .map(|location| location.script.uri.clone()),
        };

        let candidates = if parts.is_field() {
            self.member_candidates(parts, pause, &location).await
        } else {
            self.scope_candidates(pause, frame, &location).await
        };

        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|name| is_valid_identifier(name) && name.starts_with(&parts.active_word))
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }

    async fn member_candidates(
        &self,
        parts: &EditingParts,
        pause: &PauseState,
        location: &CodeLocation,
    ) -> Vec<String> {
        let receiver = receiver_expression(&parts.left_side);
        if receiver.is_empty() {
            return Vec::new();
        }

        let evaluated = with_timeout(
            self.timeout,
            self.service
                .evaluate_in_frame(&pause.isolate, pause.selected_frame, receiver),
        )
        .await;
        let instance = match evaluated {
            Ok(Value::Instance(instance)) => instance,
            Ok(other) => {
                tracing::debug!(
                    target: "lumen.inspect",
                    receiver,
                    value = %other.display_string(),
                    "receiver did not evaluate to an instance"
                );
                return Vec::new();
            }
            Err(err) => {
                tracing::debug!(
                    target: "lumen.inspect",
                    receiver,
                    error = %err,
                    "failed to evaluate autocomplete receiver"
                );
                return Vec::new();
            }
        };

        let (class, scope) = match (&instance.type_class, &instance.class) {
            (Some(type_class), _) => (type_class, MemberScope::Static),
            (None, Some(class)) => (class, MemberScope::Instance),
            (None, None) => return Vec::new(),
        };
        self.visible_members(&pause.isolate, class, scope, location)
            .await
    }

    async fn scope_candidates(
        &self,
        pause: &PauseState,
        frame: &Frame,
        location: &CodeLocation,
    ) -> Vec<String> {
        let mut candidates: Vec<String> = frame.vars.iter().map(|var| var.name.clone()).collect();

        let this_class = frame
            .vars
            .iter()
            .find(|var| var.name == "this")
            .and_then(|var| var.value.as_instance())
            .and_then(|instance| instance.class.clone());
        if let Some(class) = this_class {
            let (instance, statics) = futures::join!(
                self.visible_members(&pause.isolate, &class, MemberScope::Instance, location),
                self.visible_members(&pause.isolate, &class, MemberScope::Static, location),
            );
            candidates.extend(instance);
            candidates.extend(statics);
        }

        if let Some(library) = &location.library {
            match self
                .library_members_and_imports(&pause.isolate, library)
                .await
            {
                Ok(names) => candidates.extend(names.iter().cloned()),
                Err(err) => tracing::debug!(
                    target: "lumen.inspect",
                    library = %library.uri,
                    error = %err,
                    "failed to resolve library members"
                ),
            }
        }
        candidates
    }

    async fn visible_members(
        &self,
        isolate: &IsolateId,
        class: &ClassRef,
        scope: MemberScope,
        location: &CodeLocation,
    ) -> Vec<String> {
        match self.class_members(isolate, class, scope).await {
            Ok(members) => members
                .iter()
                .filter(|member| location.can_see(member))
                .map(|member| member.name.clone())
                .collect(),
            Err(err) => {
                tracing::debug!(
                    target: "lumen.inspect",
                    class = %class.name,
                    error = %err,
                    "failed to resolve class members"
                );
                Vec::new()
            }
        }
    }

    /// The library declaring `function`, walking through enclosing classes
    /// and functions.
    async fn owner_library(&self, isolate: &IsolateId, function: &FuncRef) -> Option<LibraryRef> {
        let mut owner = &function.owner;
        loop {
            match owner {
                FuncOwner::Library(library) => return Some(library.clone()),
                FuncOwner::Class(class) => {
                    if let Some(library) = &class.library {
                        return Some(library.clone());
                    }
                    return self
                        .class(isolate, class)
                        .await
                        .ok()
                        .map(|class| class.library.clone());
                }
                FuncOwner::Function(enclosing) => owner = &enclosing.owner,
            }
        }
    }

    async fn class(&self, isolate: &IsolateId, class: &ClassRef) -> lumen_vm::Result<Arc<Class>> {
        let key = (isolate.clone(), class.id.clone());
        self.classes
            .get_or_try_fetch(key, move || async move {
                let fetched =
                    with_timeout(self.timeout, self.service.get_class(isolate, class)).await?;
                tracing::debug!(target: "lumen.inspect", class = %class.name, "cached class");
                Ok::<_, VmError>(Arc::new(fetched))
            })
            .await
    }

    async fn library(
        &self,
        isolate: &IsolateId,
        library: &LibraryRef,
    ) -> lumen_vm::Result<Arc<Library>> {
        let key = (isolate.clone(), library.id.clone());
        self.libraries
            .get_or_try_fetch(key, move || async move {
                let fetched =
                    with_timeout(self.timeout, self.service.get_library(isolate, library)).await?;
                tracing::debug!(target: "lumen.inspect", library = %library.uri, "cached library");
                Ok::<_, VmError>(Arc::new(fetched))
            })
            .await
    }

    /// Members of `class` for the given scope. Instance members include the
    /// whole superclass chain; a failure part way up the chain keeps what was
    /// collected so far.
    async fn class_members(
        &self,
        isolate: &IsolateId,
        class: &ClassRef,
        scope: MemberScope,
    ) -> lumen_vm::Result<Arc<Vec<ClassMember>>> {
        let key = (isolate.clone(), class.id.clone(), scope);
        self.class_members
            .get_or_try_fetch(key, move || async move {
                let root = self.class(isolate, class).await?;
                let members = match scope {
                    MemberScope::Static => static_members(&root),
                    MemberScope::Instance => {
                        let mut members = Vec::new();
                        let mut visited = HashSet::new();
                        let mut next = Some(root);
                        while let Some(current) = next.take() {
                            if !visited.insert(current.reference.id.clone()) {
                                break;
                            }
                            members.extend(instance_members(&current));
                            let Some(super_class) = &current.super_class else {
                                break;
                            };
                            match self.class(isolate, super_class).await {
                                Ok(super_class) => next = Some(super_class),
                                Err(err) => tracing::warn!(
                                    target: "lumen.inspect",
                                    class = %super_class.name,
                                    error = %err,
                                    "failed to fetch superclass"
                                ),
                            }
                        }
                        members
                    }
                };
                Ok::<_, VmError>(Arc::new(members))
            })
            .await
    }

    /// Every declared name of `library`, private names included.
    async fn library_members(
        &self,
        isolate: &IsolateId,
        library: &LibraryRef,
    ) -> lumen_vm::Result<Arc<Vec<String>>> {
        let key = (isolate.clone(), library.id.clone());
        self.library_members
            .get_or_try_fetch(key, move || async move {
                let library = self.library(isolate, library).await?;
                let names = library
                    .variables
                    .iter()
                    .map(|variable| variable.name.clone())
                    .chain(
                        library
                            .functions
                            .iter()
                            .map(|function| member_name(&function.name).to_string()),
                    )
                    .chain(library.classes.iter().map(|class| class.name.clone()))
                    .collect();
                Ok::<_, VmError>(Arc::new(names))
            })
            .await
    }

    /// Names visible unqualified inside `library`: its own declarations, the
    /// public declarations of its unprefixed imports and its import prefixes.
    /// Exports are not followed.
    async fn library_members_and_imports(
        &self,
        isolate: &IsolateId,
        library: &LibraryRef,
    ) -> lumen_vm::Result<Arc<Vec<String>>> {
        let key = (isolate.clone(), library.id.clone());
        self.library_members_and_imports
            .get_or_try_fetch(key, move || async move {
                let owner = self.library(isolate, library).await?;
                let mut names = self.library_members(isolate, library).await?.to_vec();

                let imports: Vec<&LibraryDependency> = owner
                    .dependencies
                    .iter()
                    .filter(|dependency| dependency.is_import)
                    .collect();
                names.extend(
                    imports
                        .iter()
                        .filter_map(|dependency| dependency.prefix.clone()),
                );

                let unprefixed = imports
                    .iter()
                    .copied()
                    .filter(|dependency| dependency.prefix.is_none());
                let resolved = join_all(unprefixed.map(|dependency| async move {
                    (
                        dependency,
                        self.library_members(isolate, &dependency.target).await,
                    )
                }))
                .await;

                for (dependency, members) in resolved {
                    match members {
                        Ok(members) => names.extend(
                            members
                                .iter()
                                .filter(|name| {
                                    !is_private(name) && import_allows(dependency, name)
                                })
                                .cloned(),
                        ),
                        Err(err) => tracing::warn!(
                            target: "lumen.inspect",
                            import = %dependency.target.uri,
                            error = %err,
                            "skipping unresolvable import"
                        ),
                    }
                }
                Ok::<_, VmError>(Arc::new(names))
            })
            .await
    }
}

fn class_member(class: &Class, name: &str) -> ClassMember {
    ClassMember {
        name: name.to_string(),
        library: class.library.id.clone(),
        script: class
            .location
            .as_ref()
            .map(|location| location.script.uri.clone()),
    }
}

fn instance_members(class: &Class) -> Vec<ClassMember> {
    let class_name = &class.reference.name;
    let fields = class
        .fields
        .iter()
        .filter(|field| !field.is_static)
        .map(|field| class_member(class, &field.name));
    let functions = class
        .functions
        .iter()
        .filter(|function| !function.is_static)
        .filter(|function| constructor_name(class_name, &function.name).is_none())
        .map(|function| class_member(class, member_name(&function.name)));
    fields.chain(functions).collect()
}

fn static_members(class: &Class) -> Vec<ClassMember> {
    let class_name = &class.reference.name;
    let fields = class
        .fields
        .iter()
        .filter(|field| field.is_static)
        .map(|field| class_member(class, &field.name));
    let functions = class.functions.iter().filter_map(|function| {
        match constructor_name(class_name, &function.name) {
            Some(Some(named)) => Some(class_member(class, named)),
            Some(None) => None,
            None if function.is_static => Some(class_member(class, member_name(&function.name))),
            None => None,
        }
    });
    fields.chain(functions).collect()
}

/// Drives the resolver from editor input and publishes the latest results.
///
/// Every [`AutocompleteController::update`] takes a new generation; results
/// of a request that has been superseded by the time it completes are
/// dropped.
pub struct AutocompleteController {
    resolver: Arc<AutocompleteResolver>,
    generation: AtomicU64,
    results: Observable<Vec<String>>,
}

impl AutocompleteController {
    pub fn new(resolver: Arc<AutocompleteResolver>) -> Self {
        Self {
            resolver,
            generation: AtomicU64::new(0),
            results: Observable::new(Vec::new()),
        }
    }

    pub fn results(&self) -> Observable<Vec<String>> {
        self.results.clone()
    }

    /// Resolve `parts` and publish the candidates. Returns `false` when the
    /// request went stale before it completed.
    pub async fn update(&self, parts: &EditingParts, pause: Option<&PauseState>) -> bool {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let candidates = self.resolver.resolve(parts, pause).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::trace!(
                target: "lumen.inspect",
                generation,
                word = %parts.active_word,
                "discarding stale autocomplete results"
            );
            return false;
        }
        self.results.set(candidates);
        true
    }

    /// Invalidate in-flight requests and clear the published results.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.results.set(Vec::new());
    }
}
