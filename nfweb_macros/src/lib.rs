//! Derive and attribute macros for `nfweb`.
//!
//! The macros replace runtime tag reflection: every attribute is read once at
//! compile time and turned into plain trait impls that the walker, binder and
//! validator call.
//!
//! | Macro | Generates |
//! |-------|-----------|
//! | `#[derive(Validate)]` | `Validate` + `Inspect` (nested record) |
//! | `#[derive(Bind)]` | `Bind` from `#[form(...)]` fields |
//! | `#[derive(Args)]` | `Validate`, `Inspect`, `Args`, `RouteField`, and `Bind` for form/url kinds |
//! | `#[derive(Dispatcher)]` | `RouteTree` + `RouteField` that makes the record the owner of its fields |
//! | `#[derive(RouteGroup)]` | `RouteTree` + `RouteField` that keeps the enclosing owner |
//! | `#[dispatch_methods]` | `MethodTable` over the methods of an inherent `impl` block |

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::parse::{Parse, ParseStream};
use syn::spanned::Spanned;
use syn::{
    parse_macro_input, Data, DeriveInput, Field, Fields, FnArg, GenericParam, Generics, Ident, ImplItem, ItemImpl,
    LitStr, ReturnType, Type, Visibility,
};

// ---------------------------------------------------------------------------
// Attribute parsing
// ---------------------------------------------------------------------------

/// `#[route(url = "/p", method = "GET", handler = "h", before = "a,b", after = "c", view = "v.html")]`
#[derive(Default)]
struct RouteAttr {
    url: Option<LitStr>,
    method: Option<LitStr>,
    handler: Option<LitStr>,
    before: Option<LitStr>,
    after: Option<LitStr>,
    view: Option<LitStr>,
}

impl RouteAttr {
    fn from_field(field: &Field) -> syn::Result<Option<Self>> {
        let Some(attr) = field.attrs.iter().find(|a| a.path().is_ident("route")) else {
            return Ok(None);
        };
        let mut route = RouteAttr::default();
        if matches!(attr.meta, syn::Meta::Path(_)) {
            return Ok(Some(route));
        }
        attr.parse_nested_meta(|meta| {
            let slot = if meta.path.is_ident("url") {
                &mut route.url
            } else if meta.path.is_ident("method") {
                &mut route.method
            } else if meta.path.is_ident("handler") {
                &mut route.handler
            } else if meta.path.is_ident("before") {
                &mut route.before
            } else if meta.path.is_ident("after") {
                &mut route.after
            } else if meta.path.is_ident("view") {
                &mut route.view
            } else {
                return Err(meta.error("expected one of url, method, handler, before, after, view"));
            };
            *slot = Some(meta.value()?.parse()?);
            Ok(())
        })?;
        Ok(Some(route))
    }
}

/// `#[form("name")]`, `#[form(flatten)]` or `#[form(skip)]`.
enum FormAttr {
    Name(LitStr),
    Flatten,
    Skip,
}

impl Parse for FormAttr {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.peek(LitStr) {
            return Ok(FormAttr::Name(input.parse()?));
        }
        let ident: Ident = input.parse()?;
        match ident.to_string().as_str() {
            "flatten" => Ok(FormAttr::Flatten),
            "skip" => Ok(FormAttr::Skip),
            other => Err(syn::Error::new(
                ident.span(),
                format!("unexpected form option {other}, expected a name, flatten or skip"),
            )),
        }
    }
}

fn form_attr(field: &Field) -> syn::Result<Option<FormAttr>> {
    match field.attrs.iter().find(|a| a.path().is_ident("form")) {
        Some(attr) => attr.parse_args::<FormAttr>().map(Some),
        None => Ok(None),
    }
}

/// Rule string of `#[validate("...")]`; `None` when the field is skipped.
fn validate_rules(field: &Field) -> syn::Result<Option<String>> {
    match field.attrs.iter().find(|a| a.path().is_ident("validate")) {
        Some(attr) => {
            let rules: LitStr = attr.parse_args()?;
            let rules = rules.value();
            Ok((rules != "-").then_some(rules))
        }
        None => Ok(Some(String::new())),
    }
}

/// `#[args(json, field = "file")]` on an argument struct.
struct ArgsAttr {
    kind: Ident,
    field: Option<LitStr>,
}

impl ArgsAttr {
    fn from_input(input: &DeriveInput) -> syn::Result<Self> {
        let mut args = ArgsAttr {
            kind: Ident::new("Form", Span::call_site()),
            field: None,
        };
        let Some(attr) = input.attrs.iter().find(|a| a.path().is_ident("args")) else {
            return Ok(args);
        };
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("field") {
                args.field = Some(meta.value()?.parse()?);
                return Ok(());
            }
            let kind = match meta.path.get_ident().map(ToString::to_string).as_deref() {
                Some("form") => "Form",
                Some("url") => "Url",
                Some("json") => "Json",
                Some("xml") => "Xml",
                _ => return Err(meta.error("expected form, url, json, xml or field = \"...\"")),
            };
            args.kind = Ident::new(kind, meta.path.span());
            Ok(())
        })?;
        Ok(args)
    }

    fn is_body(&self) -> bool {
        self.kind == "Json" || self.kind == "Xml"
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn named_fields(input: &DeriveInput) -> syn::Result<Vec<&Field>> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(input.ident.span(), "only structs are supported"));
    };
    match &data.fields {
        Fields::Named(fields) => Ok(fields.named.iter().collect()),
        Fields::Unit => Ok(Vec::new()),
        Fields::Unnamed(_) => Err(syn::Error::new(
            input.ident.span(),
            "tuple structs are not supported, use named fields",
        )),
    }
}

fn field_ident(field: &Field) -> syn::Result<&Ident> {
    field
        .ident
        .as_ref()
        .ok_or_else(|| syn::Error::new(field.span(), "expected a named field"))
}

fn field_name(ident: &Ident) -> String {
    let name = ident.to_string();
    name.strip_prefix("r#").map(str::to_string).unwrap_or(name)
}

fn is_option(ty: &Type) -> bool {
    if let Type::Path(p) = ty {
        if let Some(seg) = p.path.segments.last() {
            return seg.ident == "Option";
        }
    }
    false
}

fn opt_str(lit: Option<&LitStr>) -> TokenStream2 {
    match lit {
        Some(l) => quote! { ::core::option::Option::Some(#l) },
        None => quote! { ::core::option::Option::None },
    }
}

/// Generics of `input` plus the walker's owner parameter `__O`.
fn owner_generics(generics: &Generics) -> Generics {
    let mut with_owner = generics.clone();
    with_owner
        .params
        .push(GenericParam::Type(syn::parse_quote!(__O: ::nfweb::walker::Dispatch)));
    with_owner
}

fn validate_impl(input: &DeriveInput, fields: &[&Field]) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut visits = Vec::new();
    for field in fields {
        let Some(rules) = validate_rules(field)? else {
            continue;
        };
        let ident = field_ident(field)?;
        let key = field_name(ident);
        let exported = matches!(field.vis, Visibility::Public(_));
        visits.push(quote! {
            visit(::nfweb::validator::FieldInfo {
                name: #key,
                rules: #rules,
                exported: #exported,
                value: &self.#ident,
            });
        });
    }
    let unused = visits.is_empty().then(|| quote! { let _ = visit; });

    Ok(quote! {
        impl #impl_generics ::nfweb::validator::Validate for #name #ty_generics #where_clause {
            fn visit_fields(&self, visit: &mut dyn FnMut(::nfweb::validator::FieldInfo<'_>)) {
                #unused
                #(#visits)*
            }
        }

        impl #impl_generics ::nfweb::validator::Inspect for #name #ty_generics #where_clause {
            fn inspect(&self) -> ::nfweb::validator::FieldValue<'_> {
                ::nfweb::validator::FieldValue::Record(self)
            }
        }
    })
}

fn bind_impl(input: &DeriveInput, fields: &[&Field]) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut binds = Vec::new();
    let mut zeros = Vec::new();
    for field in fields {
        let ident = field_ident(field)?;
        let attr = form_attr(field)?;
        zeros.push(match attr {
            Some(FormAttr::Skip) => continue,
            Some(FormAttr::Flatten) if is_option(&field.ty) => quote! { self.#ident.is_none() },
            Some(FormAttr::Flatten) => quote! { ::nfweb::binder::Bind::is_zero(&self.#ident) },
            _ => quote! { ::nfweb::binder::FormField::is_zero(&self.#ident) },
        });
        let stmt = match attr {
            Some(FormAttr::Skip) => continue,
            Some(FormAttr::Flatten) if is_option(&field.ty) => quote! {
                changed |= ::nfweb::binder::bind_embedded(&mut self.#ident, form);
            },
            Some(FormAttr::Flatten) => quote! {
                changed |= ::nfweb::binder::Bind::bind(&mut self.#ident, form);
            },
            Some(FormAttr::Name(lit)) => {
                // Only the first comma segment names the key.
                let value = lit.value();
                let head = value.split(',').next().unwrap_or_default().trim();
                let key = if head.is_empty() {
                    field_name(ident)
                } else {
                    head.to_string()
                };
                quote! {
                    changed |= ::nfweb::binder::FormField::bind_field(&mut self.#ident, #key, form);
                }
            }
            None => {
                let key = field_name(ident);
                quote! {
                    changed |= ::nfweb::binder::FormField::bind_field(&mut self.#ident, #key, form);
                }
            }
        };
        binds.push(stmt);
    }
    let body = if binds.is_empty() {
        quote! {
            let _ = form;
            false
        }
    } else {
        quote! {
            let mut changed = false;
            #(#binds)*
            changed
        }
    };
    let zero = if zeros.is_empty() {
        quote! { true }
    } else {
        quote! { #(#zeros)&&* }
    };

    Ok(quote! {
        impl #impl_generics ::nfweb::binder::Bind for #name #ty_generics #where_clause {
            fn bind(&mut self, form: &::nfweb::binder::FormData) -> bool {
                #body
            }

            fn is_zero(&self) -> bool {
                #zero
            }
        }
    })
}

fn route_tree_impl(input: &DeriveInput, fields: &[&Field]) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut attaches = Vec::new();
    for field in fields {
        let Some(route) = RouteAttr::from_field(field)? else {
            continue;
        };
        let ident = field_ident(field)?;
        let ty = &field.ty;
        let key = field_name(ident);
        let url = route.url.map_or_else(|| quote! { "" }, |l| quote! { #l });
        let method = opt_str(route.method.as_ref());
        let handler = opt_str(route.handler.as_ref());
        let before = route.before.map_or_else(|| quote! { "" }, |l| quote! { #l });
        let after = route.after.map_or_else(|| quote! { "" }, |l| quote! { #l });
        let view = opt_str(route.view.as_ref());
        attaches.push(quote! {
            <#ty as ::nfweb::walker::RouteField<__O>>::attach(
                owner,
                node.project(|p: &Self| &p.#ident),
                &::nfweb::walker::FieldDecl {
                    name: #key,
                    url: #url,
                    method: #method,
                    handler: #handler,
                    before: #before,
                    after: #after,
                    view: #view,
                },
                group,
            )?;
        });
    }
    let unused = attaches.is_empty().then(|| quote! { let _ = (owner, node, group); });

    Ok(quote! {
        impl #impl_generics ::nfweb::walker::RouteTree for #name #ty_generics #where_clause {
            fn walk_fields<__O: ::nfweb::walker::Dispatch>(
                owner: &::nfweb::walker::Owner<__O>,
                node: &::nfweb::walker::Owner<Self>,
                group: &mut ::nfweb::walker::Group<'_>,
            ) -> ::core::result::Result<(), ::nfweb::walker::WalkError> {
                #unused
                #(#attaches)*
                ::core::result::Result::Ok(())
            }
        }
    })
}

/// `RouteField` impl whose `attach` forwards to `::nfweb::walker::<attach>`.
fn route_field_impl(input: &DeriveInput, body: TokenStream2) -> TokenStream2 {
    let name = &input.ident;
    let (_, ty_generics, where_clause) = input.generics.split_for_impl();
    let with_owner = owner_generics(&input.generics);
    let (impl_generics, _, _) = with_owner.split_for_impl();

    quote! {
        impl #impl_generics ::nfweb::walker::RouteField<__O> for #name #ty_generics #where_clause {
            fn attach(
                owner: &::nfweb::walker::Owner<__O>,
                node: ::nfweb::walker::Owner<Self>,
                decl: &::nfweb::walker::FieldDecl,
                group: &mut ::nfweb::walker::Group<'_>,
            ) -> ::core::result::Result<(), ::nfweb::walker::WalkError> {
                #body
            }
        }
    }
}

fn expand(result: syn::Result<TokenStream2>) -> TokenStream {
    match result {
        Ok(tokens) => TokenStream::from(tokens),
        Err(e) => TokenStream::from(e.to_compile_error()),
    }
}

// ---------------------------------------------------------------------------
// Derives
// ---------------------------------------------------------------------------

/// Validate a record field by field with `#[validate("...")]` rules.
#[proc_macro_derive(Validate, attributes(validate))]
pub fn derive_validate(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(named_fields(&input).and_then(|fields| validate_impl(&input, &fields)))
}

/// Bind a record from form values; see `#[form(...)]`.
#[proc_macro_derive(Bind, attributes(form))]
pub fn derive_bind(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(named_fields(&input).and_then(|fields| bind_impl(&input, &fields)))
}

/// An argument record: bound, validated and handed to a route's handler.
///
/// `#[args(json | xml | form | url)]` selects the request kind (form when
/// absent); `field = "name"` reads a JSON/XML payload from a form value,
/// uploaded file or query parameter instead of the body. JSON and XML
/// records must implement `serde::Deserialize`.
#[proc_macro_derive(Args, attributes(args, form, validate))]
pub fn derive_args(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(args_impl(&input))
}

fn args_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let fields = named_fields(input)?;
    let attr = ArgsAttr::from_input(input)?;
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let validate = validate_impl(input, &fields)?;
    let kind = &attr.kind;
    let source = opt_str(attr.field.as_ref());
    let has_fields = !fields.is_empty();

    let (binding, bind) = if attr.is_body() {
        let decode = format_ident!("decode_{}", kind.to_string().to_ascii_lowercase());
        let binding = quote! {
            fn decode_body(&mut self, payload: &[u8]) -> ::core::result::Result<(), ::nfweb::binder::DecodeError> {
                *self = ::nfweb::binder::#decode(payload)?;
                ::core::result::Result::Ok(())
            }
        };
        (binding, TokenStream2::new())
    } else {
        let binding = quote! {
            fn bind_form(&mut self, form: &::nfweb::binder::FormData) {
                ::nfweb::binder::Bind::bind(self, form);
            }
        };
        (binding, bind_impl(input, &fields)?)
    };

    let route_field = route_field_impl(
        input,
        quote! {
            let _ = node;
            ::nfweb::walker::attach_args::<__O, Self>(owner, decl, group)
        },
    );

    Ok(quote! {
        #validate
        #bind

        impl #impl_generics ::nfweb::binder::Args for #name #ty_generics #where_clause {
            const KIND: ::nfweb::binder::RequestKind = ::nfweb::binder::RequestKind::#kind;
            const FIELD_SOURCE: ::core::option::Option<&'static str> = #source;
            const HAS_FIELDS: bool = #has_fields;

            #binding
        }

        #route_field
    })
}

/// A dispatcher: its routed fields resolve hooks and handlers on itself.
///
/// The type must also implement `Dispatch` and carry `#[dispatch_methods]`.
#[proc_macro_derive(Dispatcher, attributes(route))]
pub fn derive_dispatcher(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(named_fields(&input).and_then(|fields| {
        let tree = route_tree_impl(&input, &fields)?;
        let field = route_field_impl(
            &input,
            quote! { ::nfweb::walker::attach_dispatcher::<__O, Self>(owner, node, decl, group) },
        );
        Ok(quote! { #tree #field })
    }))
}

/// A plain URL group: its routed fields resolve methods on the enclosing
/// dispatcher.
#[proc_macro_derive(RouteGroup, attributes(route))]
pub fn derive_route_group(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(named_fields(&input).and_then(|fields| {
        let tree = route_tree_impl(&input, &fields)?;
        let field = route_field_impl(
            &input,
            quote! { ::nfweb::walker::attach_group::<__O, Self>(owner, node, decl, group) },
        );
        Ok(quote! { #tree #field })
    }))
}

// ---------------------------------------------------------------------------
// #[dispatch_methods]
// ---------------------------------------------------------------------------

/// Shape of one method argument after `&self`.
enum ArgShape {
    Context,
    Args(Type),
}

fn is_context(ty: &Type) -> bool {
    match ty {
        Type::Path(p) => p.path.segments.last().is_some_and(|s| s.ident == "Context"),
        _ => false,
    }
}

fn arg_shape(arg: &FnArg) -> Option<ArgShape> {
    let FnArg::Typed(pat) = arg else {
        return None;
    };
    let Type::Reference(r) = pat.ty.as_ref() else {
        return None;
    };
    if is_context(&r.elem) {
        return r.mutability.is_some().then_some(ArgShape::Context);
    }
    Some(ArgShape::Args((*r.elem).clone()))
}

fn takes_shared_self(arg: Option<&FnArg>) -> bool {
    matches!(arg, Some(FnArg::Receiver(r)) if r.reference.is_some() && r.mutability.is_none())
}

/// List the handler-shaped methods of an inherent `impl` block by name.
///
/// `fn(&self, &mut Context)` methods become hooks; `fn(&self, &mut A, &mut
/// Context)` or `fn(&self, &A, &mut Context)` methods become handlers for the
/// argument record `A`. Methods with any other shape, generic methods and
/// methods returning a value are left out of the table.
#[proc_macro_attribute]
pub fn dispatch_methods(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        let err = syn::Error::new(Span::call_site(), "dispatch_methods takes no arguments");
        return TokenStream::from(err.to_compile_error());
    }
    let block = parse_macro_input!(item as ItemImpl);
    expand(method_table(&block))
}

fn method_table(block: &ItemImpl) -> syn::Result<TokenStream2> {
    if let Some((_, path, _)) = &block.trait_ {
        return Err(syn::Error::new(path.span(), "dispatch_methods expects an inherent impl block"));
    }
    let self_ty = &block.self_ty;
    let (impl_generics, _, where_clause) = block.generics.split_for_impl();

    let mut arms = Vec::new();
    for item in &block.items {
        let ImplItem::Fn(method) = item else {
            continue;
        };
        let sig = &method.sig;
        if !sig.generics.params.is_empty() || !matches!(sig.output, ReturnType::Default) {
            continue;
        }
        let mut inputs = sig.inputs.iter();
        if !takes_shared_self(inputs.next()) {
            continue;
        }
        let rest: Vec<Option<ArgShape>> = inputs.map(arg_shape).collect();
        let ident = &sig.ident;
        let key = ident.to_string();
        let key = key.strip_prefix("r#").unwrap_or(&key).to_string();
        match rest.as_slice() {
            [Some(ArgShape::Context)] => arms.push(quote! {
                #key => ::core::option::Option::Some(::nfweb::walker::DispatchMethod::Hook(
                    |o: &Self, ctx: &mut ::nfweb::Context| Self::#ident(o, ctx),
                )),
            }),
            [Some(ArgShape::Args(args)), Some(ArgShape::Context)] => arms.push(quote! {
                #key => ::core::option::Option::Some(::nfweb::walker::DispatchMethod::Handler {
                    args: ::core::any::TypeId::of::<#args>(),
                    args_name: ::core::any::type_name::<#args>(),
                    call: |o: &Self, args: &mut dyn ::core::any::Any, ctx: &mut ::nfweb::Context| {
                        if let ::core::option::Option::Some(args) = args.downcast_mut::<#args>() {
                            Self::#ident(o, args, ctx);
                        }
                    },
                }),
            }),
            _ => {}
        }
    }

    Ok(quote! {
        #block

        impl #impl_generics ::nfweb::walker::MethodTable for #self_ty #where_clause {
            fn lookup(name: &str) -> ::core::option::Option<::nfweb::walker::DispatchMethod<Self>> {
                match name {
                    #(#arms)*
                    _ => ::core::option::Option::None,
                }
            }
        }
    })
}
